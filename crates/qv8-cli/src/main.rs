use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use qv8_isolate::{ContextScope, CreateParams, HandleScope, Isolate, IsolateConfig};
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "qv8", version, about = "Run JavaScript on a V8-style isolate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        entry: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Evaluate inline source and print the result
    Eval {
        source: String,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Args)]
struct EngineArgs {
    /// Install a global `gc()` function
    #[arg(long)]
    expose_gc: bool,
    /// V8-style flag string, e.g. "--stack-size=512 --random-seed=7"
    #[arg(long, default_value = "")]
    flags: String,
    /// Print heap statistics as JSON after the run
    #[arg(long)]
    stats: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    let uncaught = match cli.command {
        Commands::Run { entry, engine } => run_file(entry, &engine)?,
        Commands::Eval { source, engine } => eval_source(&source, &engine)?,
    };

    if uncaught > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Build an isolate that counts uncaught errors into `uncaught`
fn build_isolate(engine: &EngineArgs, uncaught: Rc<Cell<usize>>) -> Result<Isolate> {
    let mut config = IsolateConfig::from_flags(&engine.flags);
    if engine.expose_gc {
        config = config.expose_gc(true);
    }

    let params = CreateParams::new(config)
        .on_message(move |_, message, _| {
            eprintln!("Uncaught {message}");
            uncaught.set(uncaught.get() + 1);
        })
        .on_fatal_error(|location, message| {
            eprintln!("Fatal error in {location}: {message}");
        });
    Ok(Isolate::new(params)?)
}

fn run_file(entry: PathBuf, engine: &EngineArgs) -> Result<usize> {
    let uncaught = Rc::new(Cell::new(0));
    let mut isolate = build_isolate(engine, uncaught.clone())?;

    let port = isolate.port();
    let path = port.normalize_path(&entry.to_string_lossy(), None);
    let bytes = port
        .read_source(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let source = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;

    execute(&mut isolate, &source, false, engine.stats)?;
    Ok(uncaught.get())
}

fn eval_source(source: &str, engine: &EngineArgs) -> Result<usize> {
    let uncaught = Rc::new(Cell::new(0));
    let mut isolate = build_isolate(engine, uncaught.clone())?;
    execute(&mut isolate, source, true, engine.stats)?;
    Ok(uncaught.get())
}

/// Run `source` in a fresh context, then drain microtasks
fn execute(isolate: &mut Isolate, source: &str, print_result: bool, stats: bool) -> Result<()> {
    let context = isolate.new_context()?;
    let mut entered = ContextScope::new(isolate, context)?;
    let mut scope = HandleScope::new(&mut entered);

    match scope.run_script(source) {
        Ok(result) if print_result => println!("{}", scope.to_rust_string(result)?),
        Ok(_) => {}
        // Already delivered to the message callback
        Err(err) if err.is_exception() => {}
        Err(err) => return Err(err.into()),
    }

    let drained = scope.run_microtasks();
    tracing::debug!(
        ran = drained.ran,
        failed = drained.failed,
        engine_jobs = drained.engine_jobs,
        "microtasks drained"
    );

    if stats {
        println!("{}", serde_json::to_string_pretty(&scope.heap_statistics())?);
    }
    Ok(())
}
