//! CLI entrypoint for TUFLOW model inspection.

mod cli;

use std::path::Path;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tuflow_model::{
    FileGis, InputKind, Model, ModelSettings, RunContext, RunState, Severity, StdFileSystem,
};

use cli::{Cli, Command, ModelArgs};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("tuflow-inspect error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Preview(args) => preview(&args),
        Command::Inputs(args) => inputs(&args),
        Command::Files(args) => files(&args),
        Command::Conditions(args) => conditions(&args),
    }
}

fn load(args: &ModelArgs) -> anyhow::Result<Model> {
    let model = match &args.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings {}", path.display()))?;
            let settings = ModelSettings::parse(&text)?;
            Model::load_with_settings(&args.tcf, StdFileSystem::new(), FileGis, settings)?
        }
        None => Model::open(&args.tcf)?,
    };
    info!(
        "loaded {} control files, {} conditions",
        model.control_files().len(),
        model.conditions().len()
    );
    Ok(model)
}

fn context(args: &ModelArgs) -> RunContext {
    let mut context = RunContext::new();
    for scenario in &args.scenarios {
        context = context.scenario(scenario.as_str());
    }
    for event in &args.events {
        context = context.event(event.as_str());
    }
    context
}

fn run_state<'m>(model: &'m Model, args: &ModelArgs) -> anyhow::Result<RunState<'m>> {
    model
        .context(context(args))
        .context("model cannot be resolved for this selection")
}

fn display(model: &Model, path: &Path) -> String {
    path.strip_prefix(&model.config().root_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn preview(args: &ModelArgs) -> anyhow::Result<()> {
    let model = load(args)?;
    let selected = if args.has_context() {
        run_state(&model, args)?.control_files().to_vec()
    } else {
        model.control_files()
    };
    for cf in selected {
        let file = model.control_file(cf)?;
        println!("==> {} <==", display(&model, file.path()));
        print!("{}", model.preview(cf)?);
    }
    Ok(())
}

fn inputs(args: &ModelArgs) -> anyhow::Result<()> {
    let model = load(args)?;
    if args.has_context() {
        let run = run_state(&model, args)?;
        for input in run.inputs() {
            let file = model.control_file(input.control_file)?;
            println!(
                "{:<12} {}: {} == {}",
                input.kind.label(),
                display(&model, file.path()),
                input.lhs,
                input.value
            );
        }
        return Ok(());
    }
    for cf in model.control_files() {
        let file = model.control_file(cf)?;
        let name = display(&model, file.path());
        for input in model.inputs(cf)? {
            if !input.kind().is_command() {
                continue;
            }
            println!(
                "{name}:{} [{}] {} == {}",
                input.line(),
                input.scope(),
                input.lhs(),
                input.rhs()
            );
        }
    }
    Ok(())
}

fn files(args: &ModelArgs) -> anyhow::Result<()> {
    let model = load(args)?;
    if args.has_context() {
        let run = run_state(&model, args)?;
        for input in run.inputs() {
            if input.kind == InputKind::ControlFile {
                continue;
            }
            for file in &input.files {
                println!("{file}");
            }
        }
        for db in run.databases() {
            for entry in run.database_entries(db)? {
                for file in &entry.files {
                    println!("{file}");
                }
            }
        }
        return Ok(());
    }
    for cf in model.control_files() {
        for file in model.files(cf)? {
            println!("{file}");
        }
    }
    Ok(())
}

fn conditions(args: &ModelArgs) -> anyhow::Result<()> {
    let model = load(args)?;
    let mut errors = 0;
    for condition in model.conditions() {
        let location = condition
            .path
            .as_deref()
            .map(|p| display(&model, p))
            .unwrap_or_default();
        println!(
            "{} {:?} {location}: {}",
            condition.code.code(),
            condition.severity,
            condition.message
        );
        if condition.severity == Severity::Error {
            errors += 1;
        }
    }
    if errors > 0 {
        bail!("{errors} error condition(s)");
    }
    Ok(())
}
