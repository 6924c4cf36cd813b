use std::fs;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use mindmeld::cli::{Cli, Command};
use mindmeld::config::MindmeldConfig;
use mindmeld::export;
use mindmeld::logging;
use mindmeld::pipeline::{Step, StepRunner};
use mindmeld::service::http::HttpServiceConfig;
use mindmeld::service::HttpGenerationService;
use mindmeld::store::SledArtifactStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = MindmeldConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging).context("initializing logging")?;

    match cli.command {
        Command::ValidateConfig => {
            println!("configuration ok");
            Ok(())
        }
        Command::Run {
            input,
            run_name,
            force,
            steps,
            qa,
        } => {
            if run_name.is_some() {
                config.io.run_name = run_name;
            }
            if qa {
                config.runtime.qa = true;
            }

            let text = fs::read_to_string(&input)
                .with_context(|| format!("reading input {}", input.display()))?;
            let run = config.run_name(Some(&input));
            info!(run = %run, input = %input.display(), "starting synthesis run");

            let service = HttpGenerationService::new(HttpServiceConfig {
                endpoint: config.provider.endpoint.clone(),
                model: config.provider.model.clone(),
                api_key: config.provider.api_key.clone(),
                connect_timeout: config.provider.connect_timeout(),
                request_timeout: config.provider.request_timeout(),
            })
            .context("creating service client")?;

            let store = SledArtifactStore::open(&config.io.output_dir.join("artifacts"), &run)
                .context("opening artifact store")?;

            let plan = match steps {
                Some(names) => names
                    .iter()
                    .map(|name| Step::from_str(name))
                    .collect::<Result<Vec<_>, _>>()?,
                None => Step::plan(config.runtime.qa),
            };

            let output_dir = config.io.output_dir.clone();
            let runner = StepRunner::new(config, Arc::new(service), store, force);
            let outcome = runner.run(&text, &plan).await?;

            let (json_path, markmap_path) = export::write_outputs(&output_dir, &run, &outcome)?;
            println!("wrote {}", json_path.display());
            println!("wrote {}", markmap_path.display());
            Ok(())
        }
    }
}
