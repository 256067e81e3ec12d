use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::info;
use pdf_tocgen::config::FilterConfig;
use pdf_tocgen::format::dump_toc;
use pdf_tocgen::meta::search_runs;
use pdf_tocgen::pdf::PdfDocument;
use pdf_tocgen::{auto_merge_toc, extract_toc, merge_toc, MergeThresholds, Recipe};
use regex::Regex;

/// Rebuilds a PDF table of contents from the typography of its headings.
///
/// Set `RUST_LOG=debug` to trace which runs each recipe filter admits.
#[derive(Parser)]
#[command(author, version, about = "Generate a table of contents from heading styles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the table of contents described by a recipe.
    #[command(name = "gen", aliases = ["generate"])]
    Gen(GenArgs),

    /// Find runs matching a pattern and print them as recipe filters.
    #[command(name = "meta", aliases = ["xmeta"])]
    Meta(MetaArgs),
}

#[derive(Args)]
struct GenArgs {
    /// Input PDF.
    pdf: PathBuf,

    /// Recipe file (TOML).
    #[arg(short, long)]
    recipe: PathBuf,

    /// Merge headings wrapped over lines that are at most this far apart.
    #[arg(short = 't', long, conflicts_with = "auto_merge")]
    merge_threshold: Option<f64>,

    /// Derive merge thresholds from the recipe font sizes.
    #[arg(short, long)]
    auto_merge: bool,

    /// Print the vertical position of each heading.
    #[arg(long, conflicts_with = "output")]
    vpos: bool,

    /// Print JSON instead of the indented text format.
    #[arg(long, conflicts_with = "output")]
    json: bool,

    /// Write the table of contents into a copy of the PDF as bookmarks.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct MetaArgs {
    /// Input PDF.
    pdf: PathBuf,

    /// Regular expression matched against the text of each run.
    pattern: String,

    /// Only search this page (1-based).
    #[arg(short, long, value_parser = parse_page_number)]
    page: Option<usize>,

    /// Heading level of the printed filters.
    #[arg(short, long, default_value_t = 1)]
    level: i64,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Gen(args) => run_gen(args),
        Commands::Meta(args) => run_meta(args),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn run_gen(args: GenArgs) -> Result<(), Box<dyn Error>> {
    let recipe = Recipe::from_toml_str(&fs::read_to_string(&args.recipe)?)?;
    let pdf_bytes = fs::read(&args.pdf)?;
    let document = PdfDocument::load_mem(&pdf_bytes)?;

    let entries = extract_toc(&document, &recipe);
    let entries = if args.auto_merge {
        auto_merge_toc(entries, &recipe)
    } else {
        let threshold = args.merge_threshold.unwrap_or(0.0);
        merge_toc(entries, &MergeThresholds::uniform(threshold))
    };
    info!(
        "{} headings recognized in {} pages",
        entries.len(),
        document.page_count()
    );

    if let Some(output) = &args.output {
        let bytes = pdf_tocgen::bookmarks::apply_toc_bookmarks(&pdf_bytes, &entries)?;
        fs::write(output, &bytes)?;
        println!(
            "Generated {} ({} bytes) with {} bookmarks",
            output.display(),
            bytes.len(),
            entries.len()
        );
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", dump_toc(&entries, args.vpos));
    }
    Ok(())
}

fn run_meta(args: MetaArgs) -> Result<(), Box<dyn Error>> {
    let pattern = Regex::new(&args.pattern)?;
    let document = PdfDocument::load(&args.pdf)?;
    let page = args.page.map(|page| page - 1);

    for run in search_runs(&document, &pattern, page) {
        println!(
            "# {:?} on page {} at {}",
            run.text(),
            run.pagenum() + 1,
            run.vpos()
                .map_or_else(|| "unknown position".to_string(), |vpos| vpos.to_string())
        );
        println!("{}", FilterConfig::from_run(run, args.level).to_toml()?);
    }
    Ok(())
}

/// Parses a 1-based page number.
fn parse_page_number(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("page numbers start at 1".to_string()),
        Ok(page) => Ok(page),
        Err(err) => Err(err.to_string()),
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn meta_rejects_page_zero() {
        let result = Cli::try_parse_from(["pdftocgen", "meta", "doc.pdf", "^Chapter", "-p", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn meta_keeps_one_based_pages() {
        let cli = Cli::try_parse_from(["pdftocgen", "meta", "doc.pdf", "^Chapter", "-p", "3"])
            .expect("valid arguments");
        match cli.command {
            Commands::Meta(args) => assert_eq!(args.page, Some(3)),
            Commands::Gen(_) => panic!("expected the meta command"),
        }
    }

    #[test]
    fn printing_options_conflict_with_bookmark_output() {
        for flag in ["--json", "--vpos"] {
            let result = Cli::try_parse_from([
                "pdftocgen", "gen", "doc.pdf", "-r", "recipe.toml", "-o", "out.pdf", flag,
            ]);
            assert!(result.is_err(), "{flag} should conflict with --output");
        }
    }

    #[test]
    fn printing_options_are_accepted_without_output() {
        let cli = Cli::try_parse_from([
            "pdftocgen", "gen", "doc.pdf", "-r", "recipe.toml", "--json", "--vpos",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::Gen(args) => assert!(args.json && args.vpos && args.output.is_none()),
            Commands::Meta(_) => panic!("expected the gen command"),
        }
    }
}
