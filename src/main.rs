use std::path::PathBuf;

use clap::{Parser, Subcommand, Args};
use sprite_batcher::{
    app::{self, EngineError},
    config::EngineConfig,
    scenes::LevelEditorScene
};

/// # Global Arguments
#[derive(Debug, Parser)]
#[command(version, about = "Batched 2D sprite renderer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    /// Log filter used when RUST_LOG is not set
    #[arg(long = "log-level", value_name = "FILTER", default_value_t = String::from("warn"), global = true)]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Open a window and run the demo scene
    Run(SceneArgs),

    /// Run the demo scene without a window
    Headless(HeadlessArgs),
}

#[derive(Debug, Args)]
struct SceneArgs {
    /// JSON config file
    #[arg(short = 'c', long = "config", value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Sprites per batch
    #[arg(short = 'b', long = "max-batch-size", value_name = "SPRITES")]
    max_batch_size: Option<usize>,

    /// Sprites generated by the demo scene
    #[arg(short = 's', long = "sprites", value_name = "SPRITES")]
    sprites: Option<usize>,
}

#[derive(Debug, Args)]
struct HeadlessArgs {
    #[command(flatten)]
    scene: SceneArgs,

    /// Frames to simulate
    #[arg(short = 'f', long = "frames", value_name = "FRAMES", default_value_t = 60)]
    frames: u32,
}

impl SceneArgs {
    fn load_config(&self) -> Result<EngineConfig, EngineError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(max_batch_size) = self.max_batch_size {
            config.renderer.max_batch_size = max_batch_size;
        }
        if let Some(sprites) = self.sprites {
            config.demo.sprites = sprites;
        }
        Ok(config)
    }
}

fn run(mode: Mode) -> Result<(), EngineError> {
    match mode {
        Mode::Run(scene_args) => {
            let config = scene_args.load_config()?;
            let scene = LevelEditorScene::new(config.demo.clone());
            app::window::run_windowed(config, Box::new(scene))
        },
        Mode::Headless(headless_args) => {
            let config = headless_args.scene.load_config()?;
            let scene = LevelEditorScene::new(config.demo.clone());
            let summary = app::run_headless(config, Box::new(scene), headless_args.frames)?;

            println!(
                "frames={} batches={} sprites={} draw_calls={} total_draw_calls={}",
                summary.frames,
                summary.last_frame.batches,
                summary.last_frame.sprites,
                summary.last_frame.draw_calls,
                summary.total_draw_calls
            );
            Ok(())
        },
    }
}

fn main() {
    let cli_args = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli_args.log_level))
        .format_timestamp_millis()
        .format_file(false)
        .format_line_number(true)
        .init();

    log::info!("Got args: '{:?}'.", cli_args);

    if let Err(err) = run(cli_args.mode) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
