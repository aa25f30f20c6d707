#[cfg(not(feature = "output"))]
fn main() {
    eprintln!(
        "The map-memoir CLI requires the \"output\" feature. Rebuild with `--features output` to enable narration."
    );
}

#[cfg(feature = "output")]
mod cli {
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use clap::{Parser, Subcommand};
    use tokio::io::{AsyncBufReadExt, BufReader};

    use map_memoir::logging::init_tracing;
    use map_memoir::playback::{PlayOutcome, PlaybackController, RodioBackend};
    use map_memoir::{AppConfig, Credential, HttpStoryService, Place, StoryService, Theme};

    #[derive(Parser, Debug)]
    #[command(name = "map-memoir", version, about = "Place-based story narration")]
    struct Cli {
        /// JSON configuration file (environment variables override it)
        #[arg(long, global = true)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(clap::Args, Debug)]
    struct PlaceArgs {
        /// Place name
        #[arg(long)]
        place: String,

        /// Formatted address
        #[arg(long, default_value = "")]
        address: String,

        /// Narrative theme (fairy tale, documentary, sci-fi, mystery)
        #[arg(long, default_value_t = Theme::default())]
        theme: Theme,
    }

    impl PlaceArgs {
        fn to_place(&self) -> Place {
            Place::new(self.place.clone(), self.address.clone())
        }
    }

    #[derive(Subcommand, Debug)]
    enum Command {
        /// Probe the generation service
        Health,
        /// Generate and print a story for a place
        Script(PlaceArgs),
        /// Generate (or take) a story and narrate it interactively
        Narrate {
            #[command(flatten)]
            target: PlaceArgs,

            /// Narrate this text instead of generating a script
            #[arg(long)]
            text: Option<String>,
        },
        /// Print the resolved configuration
        Config,
    }

    pub async fn run() -> Result<()> {
        init_tracing();
        let cli = Cli::parse();
        let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

        match cli.command {
            Command::Health => {
                let service = HttpStoryService::new(&config.backend)?;
                service
                    .health()
                    .await
                    .with_context(|| format!("service at {} is unhealthy", config.backend.base_url))?;
                println!("Service at {} is healthy", config.backend.base_url);
            }
            Command::Script(target) => {
                let service = HttpStoryService::new(&config.backend)?;
                let script = service
                    .generate_script(&target.to_place(), target.theme)
                    .await
                    .context("generating script")?;
                println!("{}", script);
            }
            Command::Narrate { target, text } => {
                let service = HttpStoryService::new(&config.backend)?;
                let script = match text {
                    Some(text) => text,
                    None => service
                        .generate_script(&target.to_place(), target.theme)
                        .await
                        .context("generating script")?,
                };
                println!("{}\n", script);
                narrate(service, script, target.theme).await?;
            }
            Command::Config => print_config(&config)?,
        }
        Ok(())
    }

    fn print_config(config: &AppConfig) -> Result<()> {
        let credential = match Credential::classify(config.maps.api_key.as_deref()) {
            Credential::Missing => "missing",
            Credential::Placeholder => "placeholder",
            Credential::Valid => "set",
        };
        let mut shown = config.clone();
        // Never echo secrets.
        if shown.maps.api_key.is_some() {
            shown.maps.api_key = Some("***".into());
        }
        if shown.firebase.api_key.is_some() {
            shown.firebase.api_key = Some("***".into());
        }
        println!("{}", serde_json::to_string_pretty(&shown)?);
        println!("\nMaps API key:      {}", credential);
        println!(
            "Firebase project:  {}",
            if config.firebase.is_complete() { "complete" } else { "incomplete" }
        );
        Ok(())
    }

    async fn narrate(service: HttpStoryService, script: String, theme: Theme) -> Result<()> {
        let controller = PlaybackController::new(service, RodioBackend);
        let mut states = controller.subscribe();
        let mut notices = controller.notifications();

        println!("Keys: [p]=play/stop, [m]=mute, [u]=unmute, [s]=stop, [q]=quit (then Enter)\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("reading stdin")? else { break };
                    match line.trim() {
                        "p" => {
                            let player = controller.clone();
                            let script = script.clone();
                            tokio::spawn(async move {
                                match player.play(&script, theme).await {
                                    PlayOutcome::Failed(_) | PlayOutcome::Superseded => {}
                                    outcome => tracing::debug!(?outcome, "play finished"),
                                }
                            });
                        }
                        "m" => controller.mute(),
                        "u" => controller.unmute(),
                        "s" => controller.stop(),
                        "q" => break,
                        "" => {}
                        other => println!("Unknown key: {}", other),
                    }
                }
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *states.borrow_and_update();
                    println!(
                        "[{}{}]",
                        snapshot.status,
                        if snapshot.muted { ", muted" } else { "" }
                    );
                }
                notice = notices.recv() => {
                    if let Ok(notice) = notice {
                        eprintln!("Error: {}", notice);
                    }
                }
            }
        }

        controller.stop();
        Ok(())
    }
}

#[cfg(feature = "output")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
