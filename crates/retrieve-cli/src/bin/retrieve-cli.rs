use std::path::PathBuf;

use clap::{Parser, Subcommand};
use retrieve_cli::{run_image_build, run_image_search, run_text_build, run_text_search};

#[derive(Parser)]
#[command(author, version, about = "Textual and image retrieval engines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or search the textual index.
    Text {
        #[command(subcommand)]
        command: TextCommands,
    },
    /// Build or search the image index.
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
}

#[derive(Subcommand)]
enum TextCommands {
    /// Build a SPIMI + TF-IDF index from a CSV corpus.
    Build {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long = "doc-id-col")]
        doc_id_col: usize,
        #[arg(long = "text-col")]
        text_col: usize,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        language: Option<String>,
        #[arg(long = "memory-budget-mb")]
        memory_budget_mb: Option<usize>,
    },
    /// Run a free-text query against a built index.
    Search {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Train (or load) a visual vocabulary and build the image index.
    Build {
        #[arg(long)]
        images: PathBuf,
        #[arg(long)]
        descriptors: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 1000)]
        k: usize,
        #[arg(long = "sample-size", default_value_t = 3000)]
        sample_size: usize,
    },
    /// Search the image index by example descriptors.
    Search {
        #[arg(long)]
        index: PathBuf,
        #[arg(long = "query-descriptors")]
        query_descriptors: PathBuf,
        #[arg(long, default_value_t = 8)]
        k: usize,
        #[arg(long, default_value = "sequential")]
        method: String,
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Text { command } => match command {
            TextCommands::Build {
                corpus,
                doc_id_col,
                text_col,
                out,
                language,
                memory_budget_mb,
            } => run_text_build(
                &corpus,
                doc_id_col,
                text_col,
                &out,
                language.as_deref(),
                memory_budget_mb,
            ),
            TextCommands::Search { index, query, k } => run_text_search(&index, &query, k),
        },
        Commands::Image { command } => match command {
            ImageCommands::Build {
                images,
                descriptors,
                out,
                k,
                sample_size,
            } => run_image_build(&images, &descriptors, &out, k, sample_size),
            ImageCommands::Search {
                index,
                query_descriptors,
                k,
                method,
                metadata,
            } => run_image_search(&index, &query_descriptors, k, &method, metadata.as_deref()),
        },
    }
}
