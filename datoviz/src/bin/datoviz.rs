// `datoviz` CLI entry point (§6 "CLI"): a single binary with `demo` and
// `info` subcommands, grounded on `legion-labs-legion`'s broad use of
// `clap` with the `derive` feature (no `thundr`/`lluvia` precedent ships a
// CLI of its own beyond hand-parsed `std::env::args`).
//
// Exit codes: 0 success, 1 fatal error, 2 usage. Usage errors (unknown
// flag, missing subcommand) are handled by clap itself, which exits with
// status 2 before `main` ever runs the matched arm below.

use clap::{Parser, Subcommand};
use datoviz::{
    Action, Batch, ColorFormat, Content, ObjectType, Renderer, RendererConfig, Request,
    PROTOCOL_VERSION,
};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "datoviz", version, about = "Datoviz-rs renderer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a headless demo batch: create a canvas, submit a fixed number
    /// of frames, and print the resulting timeline value and timings.
    Demo {
        /// Canvas width in pixels.
        #[arg(long, default_value_t = 800)]
        width: u32,
        /// Canvas height in pixels.
        #[arg(long, default_value_t = 600)]
        height: u32,
        /// Number of frames to submit.
        #[arg(long, default_value_t = 10)]
        frames: u32,
    },
    /// Print protocol/build metadata without creating a GPU context.
    Info,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Demo { width, height, frames } => run_demo(width, height, frames),
        Command::Info => run_info(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("datoviz: fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_info() -> datoviz::Result<()> {
    println!("datoviz-rs {}", env!("CARGO_PKG_VERSION"));
    println!("protocol version: {}", PROTOCOL_VERSION);
    println!("default color format: {:?}", ColorFormat::default());
    println!("object types: canvas, dat, tex, sampler, shader, graphics, compute");
    println!("environment variables:");
    println!("  DVZ_DUMP=1             dump the committed request stream on shutdown");
    println!("  DVZ_LOG_LEVEL=0..5     trace, debug, info, warn, error, fatal");
    println!("  DVZ_CAPTURE=1          enable validation/diagnostics");
    println!("  DVZ_CANVAS_GLFW_LOOP=1 keep the event loop alive until Escape");
    Ok(())
}

fn run_demo(width: u32, height: u32, frames: u32) -> datoviz::Result<()> {
    let config = RendererConfig::builder().build();
    let mut renderer = Renderer::new(&config)?;

    let registry = renderer.registry();
    let mut batch = Batch::new();
    let canvas_id = batch.add(
        &registry,
        Request::new(
            Action::Create,
            ObjectType::Canvas,
            Content::CreateCanvas {
                width,
                height,
                clear: [1.0, 1.0, 1.0, 1.0],
                flags: 0,
            },
        ),
    );
    renderer.commit(&batch)?;

    for i in 0..frames {
        let canvas = renderer
            .canvas_mut(canvas_id)
            .expect("canvas just created by commit");
        canvas.frame()?;
        canvas.submit()?;
        println!("frame {} submitted, timeline value = {}", i, canvas.timeline_value());
    }

    let mut delete = Request::new(Action::Delete, ObjectType::Canvas, Content::Delete);
    delete.target_id = canvas_id;
    let mut teardown = Batch::new();
    teardown.add(&registry, delete);
    renderer.commit(&teardown)?;

    renderer.dump_if_configured()?;
    Ok(())
}
