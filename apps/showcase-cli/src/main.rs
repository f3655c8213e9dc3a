use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use showcase_assets::{AssetSource, Font, FsSource, build_text_geometry};
use showcase_common::SurfaceSize;
use showcase_stage::{CodecConfig, HeadlessHost, LoadOrder, Mounted, ShowcaseConfig};
use showcase_tools::SceneInspector;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "showcase-cli", about = "CLI tool for showcase operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML config merged over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Asset directory, overrides the config
    #[arg(long, global = true)]
    assets: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Load every asset headlessly and report the resulting scene
    Validate {
        /// Load the environment alongside the model
        #[arg(long)]
        concurrent: bool,
        /// Print the rendered debug frame
        #[arg(long)]
        frame: bool,
    },
    /// Show font metrics and the extruded size of a text
    InspectFont {
        /// Font file, defaults to the configured font under the asset root
        path: Option<PathBuf>,
        /// Text to measure, defaults to the configured text
        #[arg(short, long)]
        text: Option<String>,
    },
    /// Print the effective configuration
    PrintConfig {
        #[arg(long, value_enum, default_value = "yaml")]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

fn load_config(cli: &Cli) -> anyhow::Result<ShowcaseConfig> {
    let mut config = match &cli.config {
        Some(path) => ShowcaseConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ShowcaseConfig::default(),
    };
    if let Some(root) = &cli.assets {
        config.assets.root = root.clone();
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Info => {
            println!("showcase-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", showcase_render::crate_info());
            println!("tools: {}", showcase_tools::crate_info());
            println!("assets: {}", config.assets.root.display());
            println!("decoder: {}", config.model.decoder_path);
            let codec = match &config.model.codec {
                CodecConfig::Bundle { runtime } => format!("decoder bundle via {runtime}"),
                CodecConfig::Command { command } => command.join(" "),
                CodecConfig::Disabled => "none".into(),
            };
            println!("codec: {codec}");
        }
        Commands::Validate { concurrent, frame } => {
            if concurrent {
                config.load_order = LoadOrder::Concurrent;
            }
            let source = FsSource::new(config.assets.root.clone());
            let mut mounted = Mounted::mount(HeadlessHost::new(SurfaceSize::default()), config)?;

            let mut events = Vec::new();
            pollster::block_on(mounted.load_pipeline().run(&source, &mut events));
            for event in events {
                if let Err(e) = mounted.apply(event) {
                    tracing::warn!("load event rejected: {e}");
                }
            }
            let output = mounted.frame()?;

            let stage = mounted.stage();
            println!("{}", SceneInspector::summary(stage.scene()));
            for (_, name) in SceneInspector::list_nodes(stage.scene()) {
                if let Some(info) = SceneInspector::inspect_node(stage.scene(), &name) {
                    println!("  {info}");
                }
            }
            if let (true, Some(output)) = (frame, output) {
                print!("{output}");
            }

            let failures: Vec<String> = stage
                .diagnostics()
                .entries()
                .iter()
                .map(ToString::to_string)
                .collect();
            mounted.unmount();
            if !failures.is_empty() {
                bail!("{} stage(s) failed:\n  {}", failures.len(), failures.join("\n  "));
            }
            println!("All assets loaded.");
        }
        Commands::InspectFont { path, text } => {
            let asset = match path {
                Some(path) => {
                    let dir = path.parent().map(PathBuf::from).unwrap_or_default();
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .context("font path has no file name")?
                        .to_string();
                    pollster::block_on(FsSource::new(dir).fetch(&name))?
                }
                None => pollster::block_on(
                    FsSource::new(config.assets.root.clone()).fetch(&config.assets.font),
                )?,
            };
            let font = Font::from_json(&asset.bytes)?;
            let text = text.unwrap_or_else(|| config.text.content.clone());

            println!("{}", SceneInspector::font(&font, &text));
            let geometry = build_text_geometry(&font, &text, &config.text.options)?;
            let size = geometry
                .bounding_box()
                .map(|b| b.size())
                .unwrap_or_default();
            println!(
                "Text {:?}: {} vertices, {} triangles, size=({:.3}, {:.3}, {:.3})",
                text,
                geometry.vertex_count(),
                geometry.triangle_count(),
                size.x,
                size.y,
                size.z
            );
        }
        Commands::PrintConfig { format } => match format {
            Format::Yaml => print!("{}", config.to_yaml()?),
            Format::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        },
    }

    Ok(())
}
