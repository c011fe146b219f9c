use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::{Result, eyre::WrapErr};
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use incident_qa::call::{InteractionTrace, TurnEvent};
use incident_qa::config::{Backend, Config};
use incident_qa::eval::EvalSuite;
use incident_qa::format::format_value;
use incident_qa::llm::{ModelGateway, OllamaBackend};
use incident_qa::manual::parse_manual_command;
use incident_qa::prompt::{build_tool_system_prompt, tool_summaries, variant_names};
use incident_qa::AppContext;

#[derive(Parser, Debug)]
#[command(name = "incident_qa")]
#[command(about = "Ask questions about the incident dataset through a tool-calling language model")]
struct Args {
    /// Question to answer (omit for interactive mode)
    #[arg(short = 'q', long)]
    question: Option<String>,

    /// Re-download the dataset from the open-data API
    #[arg(long)]
    refresh: bool,

    /// Run a tool directly, e.g. "query_incidents_advanced ward=7" or "get_iucr_info 0110"
    #[arg(long)]
    tool: Option<String>,

    /// YAML config file (env overrides still apply)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Override the dataset CSV path
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Prompt variant (tool_use_v1, tool_use_reasoned)
    #[arg(long)]
    variant: Option<String>,

    /// Completion backend (ollama, openai)
    #[arg(long)]
    backend: Option<Backend>,

    /// Model name for the selected backend
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Write the turn's interaction trace as JSON
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Re-render the tool result of a saved trace and exit
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Grade the model against a YAML case file and print the report
    #[arg(long, value_name = "CASES_YAML")]
    evaluate: Option<PathBuf>,

    /// Where to write the JSON grading report (default: eval_results_<timestamp>.json)
    #[arg(long, requires = "evaluate")]
    eval_out: Option<PathBuf>,

    /// Print the tool catalog and exit
    #[arg(long)]
    list_tools: bool,

    /// Print the rendered system prompt and exit
    #[arg(long)]
    show_prompt: bool,

    /// Print turn events to stderr
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut c = Config::from_yaml_file(path)?;
            c.apply_env()?;
            c
        }
        None => Config::from_env()?,
    };
    if let Some(p) = &args.csv_path {
        config.csv_path = p.clone();
    }
    if let Some(v) = &args.variant {
        config.prompt_variant = v.clone();
    }
    if let Some(b) = args.backend {
        config.backend = b;
    }
    if let Some(m) = &args.model {
        config.model = m.clone();
    }
    Ok(config)
}

fn replay(path: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("reading trace {}", path.display()))?;
    let trace: InteractionTrace = serde_json::from_str(&text).wrap_err("decoding interaction trace")?;
    println!("❓ {}", trace.question);
    match &trace.raw_result {
        Some(raw) => println!("{}", format_value(raw)),
        None => println!("{}", trace.final_answer),
    }
    info!(target: "cli", state = %trace.state, "trace_replayed");
    Ok(())
}

fn warn_if_model_missing(config: &Config) {
    if config.backend != Backend::Ollama {
        return;
    }
    match OllamaBackend::from_config(config).and_then(|b| b.has_model()) {
        Ok(true) => {}
        Ok(false) => eprintln!("⚠️  Model {} not found. Pull it with: ollama pull {}", config.model, config.model),
        Err(e) => warn!(target: "cli", error = %e, "ollama_model_check_failed"),
    }
}

fn answer(ctx: &AppContext, gateway: &ModelGateway, question: &str, verbose: bool) -> InteractionTrace {
    let trace = ctx.ask(gateway, question, |ev: &TurnEvent| {
        if verbose {
            eprintln!("🔧 {ev}");
        }
    });
    println!("{}", trace.final_answer);
    trace
}

fn write_trace(path: &PathBuf, trace: &InteractionTrace) -> Result<()> {
    let json = serde_json::to_string_pretty(trace)?;
    std::fs::write(path, json).wrap_err_with(|| format!("writing trace {}", path.display()))
}

fn evaluate(ctx: &AppContext, gateway: &ModelGateway, cases: &PathBuf, out: Option<&PathBuf>) -> Result<()> {
    let suite = EvalSuite::from_yaml_file(cases)?;
    eprintln!("🧪 Grading {} on {} cases", ctx.config.model, suite.cases.len());
    let report = ctx.evaluate(gateway, &suite);
    print!("{report}");
    let path = match out {
        Some(p) => p.clone(),
        None => PathBuf::from(format!("eval_results_{}.json", report.timestamp.format("%Y%m%d_%H%M%S"))),
    };
    report.write_json(&path)?;
    eprintln!("💾 Results saved to: {}", path.display());
    Ok(())
}

fn interactive(ctx: &AppContext, gateway: &ModelGateway, verbose: bool) -> Result<()> {
    println!("Ask a question (\"/tool <command>\" runs a tool directly, \"quit\" exits).");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => {}
        }
        if let Some(cmd) = line.strip_prefix("/tool ") {
            match parse_manual_command(cmd) {
                Ok(call) => println!("{}", ctx.run_tool(&call).formatted_result),
                Err(e) => println!("❌ {e}"),
            }
            continue;
        }
        answer(ctx, gateway, line, verbose);
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    // ログ: 標準出力は回答用に空けておき、ファイルへのみ出力する
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false); // ファイルにANSIカラー不要

    tracing_subscriber::registry().with(env_filter).with(file_layer).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(target: "cli", backend = ?config.backend, model = %config.model, variant = %config.prompt_variant, "starting");

    if args.list_tools {
        println!("{}", tool_summaries(incident_qa::tools::catalog()));
        println!("\nPrompt variants: {}", variant_names().join(", "));
        return Ok(());
    }
    if args.show_prompt {
        println!("{}", build_tool_system_prompt(&config.prompt_variant, incident_qa::tools::catalog()));
        return Ok(());
    }
    if let Some(path) = &args.replay {
        return replay(path);
    }

    let ctx = AppContext::new(config);
    let records = ctx.load(args.refresh)?;
    eprintln!("✅ Loaded {records} incident records");

    if let Some(cmd) = &args.tool {
        let call = parse_manual_command(cmd)?;
        println!("{}", ctx.run_tool(&call).formatted_result);
        return Ok(());
    }

    warn_if_model_missing(&ctx.config);
    let gateway = ctx.gateway()?;

    if let Some(cases) = &args.evaluate {
        return evaluate(&ctx, &gateway, cases, args.eval_out.as_ref());
    }

    match &args.question {
        Some(q) => {
            let trace = answer(&ctx, &gateway, q, args.verbose);
            if let Some(path) = &args.trace_out {
                write_trace(path, &trace)?;
            }
            Ok(())
        }
        None => interactive(&ctx, &gateway, args.verbose),
    }
}
