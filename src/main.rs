use clap::Parser;
use tracing::info;

use crag::cli::Cli;
use crag::config::Config;
use crag::gitlab::GitLabClient;
use crag::models::Recommendation;
use crag::report::to_gitlab_comment;
use crag::review::ReviewDriver;

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        mr_iid = config.mr_iid,
        project = %config.project,
        repo = %config.repo_path,
        "crag starting"
    );

    let mut driver = match ReviewDriver::new(config.clone()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let result = match driver.run().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    };

    let comment = to_gitlab_comment(&result);

    if config.post {
        let gitlab = GitLabClient::new(
            &config.gitlab_base_url,
            &config.gitlab_token,
            &config.project,
        );
        if let Err(e) = gitlab.post_mr_note(config.mr_iid, &comment) {
            eprintln!("error: failed to post review: {e}");
            std::process::exit(2);
        }
        info!("review posted as MR note");
    } else {
        println!("{comment}");
    }

    info!(
        recommendation = %result.recommendation,
        files = result.files_reviewed.len(),
        findings = result.findings.len(),
        "review finished"
    );

    if result.recommendation == Recommendation::RequestChanges {
        std::process::exit(1);
    }
}
