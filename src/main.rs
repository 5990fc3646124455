use clap::Parser;

use llm_harvest::Cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match llm_harvest::run(cli).await {
        Ok(report) => {
            println!("Run complete.\nReport:");
            println!("{report:#?}");
            if report.is_clean() {
                std::process::exit(0);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("[ERROR] Ingestion run failed: {e:#}");
            std::process::exit(1);
        }
    }
}
