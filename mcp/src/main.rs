use clap::Parser;

use dooray_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "dooray-mcp",
    version,
    about = "Dooray MCP server — project, wiki, and drive tools over stdio"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "DOORAY_API_URL", default_value = "https://api.dooray.com")]
    api_url: String,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let code = run_mcp(&cli.api_url, cli.command).await;
    std::process::exit(code);
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    // stdout carries the MCP protocol; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
