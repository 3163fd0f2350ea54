use clap::{Parser, Subcommand};
use paper_assistant::Result;
use paper_assistant::commands::{
    delete_paper, ingest_paper, list_papers, search_paper, show_status,
};
use paper_assistant::config::{Config, load_default, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "paper-assistant")]
#[command(about = "Ingest arXiv papers and search them passage by passage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, chunking and arXiv settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Download, chunk and embed a paper
    Ingest {
        /// arXiv id (e.g. 1706.03762) or arxiv.org abs/pdf URL
        paper: String,
    },
    /// List ingested papers
    List,
    /// Find the passages of a paper most relevant to a query
    Search {
        /// arXiv id or URL of an ingested paper
        paper: String,
        /// Free-text query
        query: String,
        /// Number of passages to return
        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
    /// Delete a paper and its stored chunks
    Delete {
        /// arXiv id or URL of the paper
        paper: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show status of Ollama and the local stores
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&load_default()?);
            } else {
                run_interactive_config(&Config::default_dir()?)?;
            }
        }
        Commands::Ingest { paper } => {
            ingest_paper(load_default()?, &paper).await?;
        }
        Commands::List => {
            list_papers(&load_default()?).await?;
        }
        Commands::Search {
            paper,
            query,
            limit,
        } => {
            search_paper(load_default()?, &paper, &query, limit).await?;
        }
        Commands::Delete { paper, yes } => {
            delete_paper(load_default()?, &paper, yes).await?;
        }
        Commands::Status => {
            show_status(&load_default()?).await?;
        }
    }

    Ok(())
}
