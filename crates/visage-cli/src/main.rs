use std::cell::Cell;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use visage_contracts::events::{EventLog, EventPayload};
use visage_contracts::images::{extension_for_mime, ImageRef};
use visage_contracts::models::ModelTier;
use visage_contracts::settings::{AspectRatio, BlendSettings, FinalSettings};
use visage_contracts::summary::SessionSummary;
use visage_engine::{
    timestamp_millis, BatchOutcome, DryRunBackend, GeminiBackend, GenerationClient, StateObserver,
    WorkflowController, WorkflowState, WorkflowStep,
};

#[derive(Debug, Parser)]
#[command(name = "visage", version, about = "Face blend workflow driver")]
struct Cli {
    /// Run directory for generated images, events.jsonl, and summary.json.
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    api_key: Option<String>,
    /// Use the offline placeholder backend instead of Gemini.
    #[arg(long)]
    dry_run: bool,
    /// Gemini request timeout in seconds (clamped to 15-300).
    #[arg(long)]
    timeout: Option<f64>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("visage error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    fs::create_dir_all(&cli.out)
        .with_context(|| format!("failed to create {}", cli.out.display()))?;

    let workflow_id = format!("wf-{}", timestamp_millis());
    let events_path = cli
        .events
        .clone()
        .unwrap_or_else(|| cli.out.join("events.jsonl"));
    let events = EventLog::new(&events_path, &workflow_id);
    let mut summary = SessionSummary::begin(&workflow_id);

    let mut controller = WorkflowController::new();
    let stats = Rc::new(SessionStats::default());
    controller.subscribe(Box::new(SessionObserver::new(
        cli.out.clone(),
        events.clone(),
        stats.clone(),
    )));

    let backend_name = if cli.dry_run {
        controller.install_client(GenerationClient::with_backend(Box::new(DryRunBackend)));
        println!("dry-run backend installed; no credential required");
        "dryrun"
    } else if let Some(key) = resolve_credential(&cli) {
        match cli.timeout {
            Some(seconds) => {
                let backend = GeminiBackend::new(key.trim()).with_timeout_seconds(seconds);
                controller.install_client(GenerationClient::with_backend(Box::new(backend)));
            }
            None => controller.submit_credential(&key)?,
        }
        println!("credential accepted; blend step ready");
        "gemini"
    } else {
        bail!(
            "no credential: pass --api-key, set GEMINI_API_KEY or GOOGLE_API_KEY, \
             or use --dry-run"
        );
    };

    emit_or_warn(
        &events,
        "session_started",
        json!({
            "backend": backend_name,
            "out_dir": cli.out.to_string_lossy().to_string(),
        }),
    );
    print_help();

    loop {
        print!("visage> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let tokens = match shell_words::split(line.trim()) {
            Ok(tokens) => tokens,
            Err(err) => {
                println!("parse error: {err}");
                continue;
            }
        };
        if tokens.is_empty() {
            continue;
        }
        if !handle_command(&mut controller, &tokens, &mut summary, &events) {
            break;
        }
    }

    summary.candidates = stats.candidates_saved.get();
    summary.final_results = stats.results_saved.get();
    if let Some(message) = controller.state().error_message.clone() {
        summary.last_error = Some(message);
    }
    summary.write(&cli.out.join("summary.json"))?;
    emit_or_warn(
        &events,
        "session_finished",
        json!({
            "blend_batches": summary.blend_batches,
            "final_batches": summary.final_batches,
            "candidates": summary.candidates,
            "final_results": summary.final_results,
        }),
    );
    println!("session written to {}", cli.out.display());
    Ok(0)
}

fn resolve_credential(cli: &Cli) -> Option<String> {
    cli.api_key
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| non_empty_env("GEMINI_API_KEY"))
        .or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns false when the session should end.
fn handle_command(
    controller: &mut WorkflowController,
    tokens: &[String],
    summary: &mut SessionSummary,
    events: &EventLog,
) -> bool {
    match tokens[0].as_str() {
        "help" => print_help(),
        "status" => println!("{}", render_status(controller.state())),
        "blend" => match parse_blend_command(&tokens[1..]) {
            Ok(settings) => match controller.submit_blend(settings) {
                Ok(outcome) => {
                    summary.blend_batches += 1;
                    report_outcome("blend", &outcome);
                    emit_or_warn(
                        events,
                        "batch_finished",
                        json!({ "kind": "blend", "outcome": outcome_label(&outcome) }),
                    );
                    if !controller.state().blend_candidates.is_empty() {
                        println!("pick a candidate with: pick <id>");
                    }
                }
                Err(err) => println!("error: {err}"),
            },
            Err(err) => println!("error: {err}"),
        },
        "pick" => {
            if tokens.len() != 2 {
                println!("usage: pick <candidate-id>");
                return true;
            }
            match controller.select_candidate(&tokens[1]) {
                Ok(()) => {
                    if controller.state().step == WorkflowStep::ConfiguringFinal {
                        println!("candidate {} selected; final step ready", tokens[1]);
                    } else {
                        println!("no candidate with id '{}' in the current batch", tokens[1]);
                    }
                }
                Err(err) => println!("error: {err}"),
            }
        }
        "final" => match parse_final_command(&tokens[1..]) {
            Ok(settings) => match controller.submit_final(settings) {
                Ok(outcome) => {
                    summary.final_batches += 1;
                    report_outcome("final", &outcome);
                    emit_or_warn(
                        events,
                        "batch_finished",
                        json!({ "kind": "final", "outcome": outcome_label(&outcome) }),
                    );
                }
                Err(err) => println!("error: {err}"),
            },
            Err(err) => println!("error: {err}"),
        },
        "regen" => match controller.navigate(WorkflowStep::ConfiguringFinal) {
            Ok(()) => println!("back on the final step; adjust and resubmit with 'final'"),
            Err(err) => println!("error: {err}"),
        },
        "restart" => match controller.navigate(WorkflowStep::ConfiguringBlend) {
            Ok(()) => println!("workflow reset to the blend step"),
            Err(err) => println!("error: {err}"),
        },
        "quit" | "exit" => return false,
        other => println!("unknown command '{other}' (try 'help')"),
    }
    true
}

fn print_help() {
    println!("commands:");
    println!("  blend <person1> <person2> [ratio=50] [quantity=1] [model=flash] [aspect=1:1]");
    println!("  pick <candidate-id>");
    println!("  final <pose> <clothing> [quantity=1] [model=flash] [aspect=1:1]");
    println!("  regen     return to the final step to resubmit");
    println!("  restart   start over from the blend step");
    println!("  status    show workflow state");
    println!("  quit");
}

fn report_outcome(kind: &str, outcome: &BatchOutcome) {
    match outcome {
        BatchOutcome::Completed => println!("{kind} batch completed"),
        BatchOutcome::HaltedRateLimited {
            retry_after_seconds,
        } => println!("{kind} batch halted: rate limited, retry in {retry_after_seconds}s"),
        BatchOutcome::HaltedFailed { reason } => println!("{kind} batch halted: {reason}"),
    }
}

fn outcome_label(outcome: &BatchOutcome) -> &'static str {
    match outcome {
        BatchOutcome::Completed => "completed",
        BatchOutcome::HaltedRateLimited { .. } => "rate_limited",
        BatchOutcome::HaltedFailed { .. } => "failed",
    }
}

fn render_status(state: &WorkflowState) -> String {
    let mut lines = vec![format!("step: {}", state.step.as_str())];
    if state.is_generating {
        lines.push("generating...".to_string());
    }
    if let Some(settings) = &state.blend_settings {
        lines.push(format!(
            "blend settings: {}%/{}% split, model {}, aspect {}, quantity {}",
            100 - settings.blend_ratio,
            settings.blend_ratio,
            settings.model.as_str(),
            settings.aspect_ratio.as_str(),
            settings.quantity,
        ));
    }
    lines.push(format!("candidates: {}", state.blend_candidates.len()));
    for candidate in &state.blend_candidates {
        let marker = if state
            .selected_candidate
            .as_ref()
            .map(|selected| selected.id == candidate.id)
            .unwrap_or(false)
        {
            " (selected)"
        } else {
            ""
        };
        lines.push(format!("  {}{marker}", candidate.id));
    }
    lines.push(format!("final results: {}", state.final_results.len()));
    if let Some(error) = &state.error_message {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy)]
struct GenerationOptions {
    blend_ratio: u8,
    quantity: u32,
    model: ModelTier,
    aspect_ratio: AspectRatio,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            blend_ratio: 50,
            quantity: 1,
            model: ModelTier::Flash,
            aspect_ratio: AspectRatio::Square,
        }
    }
}

fn parse_generation_options(args: &[String]) -> Result<GenerationOptions> {
    let mut options = GenerationOptions::default();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected key=value option, got '{arg}'");
        };
        match key {
            "ratio" => {
                options.blend_ratio = value
                    .parse()
                    .with_context(|| format!("invalid ratio '{value}'"))?
            }
            "quantity" => {
                options.quantity = value
                    .parse()
                    .with_context(|| format!("invalid quantity '{value}'"))?
            }
            "model" => {
                options.model = ModelTier::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("unknown model '{value}' (flash or pro)"))?
            }
            "aspect" => {
                options.aspect_ratio = AspectRatio::parse(value).ok_or_else(|| {
                    anyhow::anyhow!("unknown aspect ratio '{value}' (1:1, 16:9, 9:16, 4:3, 3:4)")
                })?
            }
            other => bail!("unknown option '{other}'"),
        }
    }
    Ok(options)
}

fn parse_blend_command(args: &[String]) -> Result<BlendSettings> {
    if args.len() < 2 {
        bail!("usage: blend <person1> <person2> [ratio=50] [quantity=1] [model=flash] [aspect=1:1]");
    }
    let options = parse_generation_options(&args[2..])?;
    Ok(BlendSettings::new(
        ImageRef::from_path(&args[0]),
        ImageRef::from_path(&args[1]),
        options.blend_ratio,
        options.model,
        options.aspect_ratio,
        options.quantity,
    ))
}

fn parse_final_command(args: &[String]) -> Result<FinalSettings> {
    if args.len() < 2 {
        bail!("usage: final <pose> <clothing> [quantity=1] [model=flash] [aspect=1:1]");
    }
    if args.iter().any(|arg| arg.starts_with("ratio=")) {
        bail!("ratio is not a final-step option");
    }
    let options = parse_generation_options(&args[2..])?;
    Ok(FinalSettings::new(
        ImageRef::from_path(&args[0]),
        ImageRef::from_path(&args[1]),
        options.model,
        options.aspect_ratio,
        options.quantity,
    ))
}

#[derive(Debug, Default)]
struct SessionStats {
    candidates_saved: Cell<u64>,
    results_saved: Cell<u64>,
}

/// Saves every streamed image under the run directory and mirrors each state
/// publish into the event log.
struct SessionObserver {
    out_dir: PathBuf,
    events: EventLog,
    stats: Rc<SessionStats>,
    seen_candidates: Cell<usize>,
    seen_results: Cell<usize>,
}

impl SessionObserver {
    fn new(out_dir: PathBuf, events: EventLog, stats: Rc<SessionStats>) -> Self {
        Self {
            out_dir,
            events,
            stats,
            seen_candidates: Cell::new(0),
            seen_results: Cell::new(0),
        }
    }

    fn save_image(&self, name: &str, image: &ImageRef) -> Result<PathBuf> {
        let (bytes, mime) = image.read()?;
        let path = self
            .out_dir
            .join(format!("{name}.{}", extension_for_mime(Some(&mime))));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

impl StateObserver for SessionObserver {
    fn state_changed(&self, state: &WorkflowState) {
        // A shrinking sequence means a new batch replaced the old one.
        if state.blend_candidates.len() < self.seen_candidates.get() {
            self.seen_candidates.set(0);
        }
        if state.final_results.len() < self.seen_results.get() {
            self.seen_results.set(0);
        }

        for candidate in &state.blend_candidates[self.seen_candidates.get()..] {
            match self.save_image(&candidate.id, &candidate.image) {
                Ok(path) => {
                    println!("  candidate {} -> {}", candidate.id, path.display());
                    self.stats
                        .candidates_saved
                        .set(self.stats.candidates_saved.get() + 1);
                    emit_or_warn(
                        &self.events,
                        "candidate_streamed",
                        json!({
                            "id": candidate.id,
                            "path": path.to_string_lossy().to_string(),
                        }),
                    );
                }
                Err(err) => eprintln!("failed to save candidate {}: {err:#}", candidate.id),
            }
        }
        self.seen_candidates.set(state.blend_candidates.len());

        let start = self.seen_results.get();
        for (offset, image) in state.final_results[start..].iter().enumerate() {
            let name = format!("artifact-{}-{:02}", timestamp_millis(), start + offset);
            match self.save_image(&name, image) {
                Ok(path) => {
                    println!("  result -> {}", path.display());
                    self.stats
                        .results_saved
                        .set(self.stats.results_saved.get() + 1);
                    emit_or_warn(
                        &self.events,
                        "result_streamed",
                        json!({ "path": path.to_string_lossy().to_string() }),
                    );
                }
                Err(err) => eprintln!("failed to save result: {err:#}"),
            }
        }
        self.seen_results.set(state.final_results.len());

        emit_or_warn(
            &self.events,
            "state_published",
            json!({
                "step": state.step.as_str(),
                "generating": state.is_generating,
                "candidates": state.blend_candidates.len(),
                "final_results": state.final_results.len(),
                "error": state.error_message,
            }),
        );
    }
}

fn emit_or_warn(events: &EventLog, event_type: &str, payload: Value) {
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        eprintln!("event log write failed: {err:#}");
    }
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
