use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::EnvFilter;
use txhammer::{Args, print_final_report, run_load_test};

fn init_logging(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
    if json {
        let _ = tracing_subscriber::fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_logging(args.log_json);

    let summary = match run_load_test(&args).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Load test aborted");
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_final_report(&summary);
    }
    Ok(())
}
