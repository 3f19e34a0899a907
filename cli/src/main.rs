//! pdfremedy CLI - PDF accessibility remediation tool

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use pdfremedy::{
    read_instructions, remediate, to_json, validate, InspectOptions, InspectionReport, Inspector,
    InstructionSet, InterpretOptions, JsonFormat,
};

#[derive(Parser)]
#[command(name = "pdfremedy")]
#[command(version)]
#[command(about = "Remediate and inspect PDF accessibility", long_about = None)]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an instruction document without touching any PDF
    Validate {
        /// Instruction file (YAML or JSON)
        #[arg(value_name = "FILE")]
        instructions: PathBuf,
    },

    /// Apply an instruction document to a PDF
    Apply {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Instruction file (YAML or JSON)
        #[arg(short, long, value_name = "FILE")]
        instructions: PathBuf,

        /// Output file (defaults to <input>.remediated.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Warn about unmatched regions instead of failing
        #[arg(long)]
        lenient: bool,

        /// Read instruction boxes with the origin at the top-left corner
        #[arg(long)]
        top_left_origin: bool,

        /// Write new content streams uncompressed
        #[arg(long)]
        no_compress: bool,
    },

    /// Write a structural JSON report of a PDF
    Inspect {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output compact JSON
        #[arg(long)]
        compact: bool,

        /// Embed font program bytes as hex
        #[arg(long)]
        font_programs: bool,
    },

    /// Show an accessibility summary
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Validate { instructions } => cmd_validate(&instructions),
        Commands::Apply {
            input,
            instructions,
            output,
            lenient,
            top_left_origin,
            no_compress,
        } => {
            let mut options = InterpretOptions::new()
                .with_processor("pdfremedy", env!("CARGO_PKG_VERSION"))
                .with_compression(!no_compress);
            if lenient {
                options = options.lenient();
            }
            if top_left_origin {
                options = options.top_left_origin();
            }
            cmd_apply(&input, &instructions, output.as_deref(), options)
        }
        Commands::Inspect {
            input,
            output,
            compact,
            font_programs,
        } => cmd_inspect(&input, output.as_deref(), compact, font_programs),
        Commands::Info { input } => cmd_info(&input),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `-v` raises the default `warn` level.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_instructions(path: &Path) -> Result<InstructionSet, Box<dyn std::error::Error>> {
    let set = read_instructions(path)?;
    let errors = validate(&set);
    if errors.is_empty() {
        return Ok(set);
    }
    eprintln!(
        "{} {} error(s) in {}",
        "Invalid:".red().bold(),
        errors.len(),
        path.display()
    );
    for error in &errors {
        eprintln!("  {} {}: {}", "-".dimmed(), error.field.yellow(), error.message);
    }
    Err(pdfremedy::Error::Validation(errors).into())
}

fn cmd_validate(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let set = load_instructions(path)?;

    println!("{} {}", "Valid:".green().bold(), path.display());
    let nodes = set.structure_nodes().len();
    let rows = [
        ("Structure nodes", nodes),
        ("Content bindings", set.content_tagging.len()),
        ("Artifacts", set.artifacts.len()),
        ("Annotation operations", set.annotations.len()),
        ("Font operations", set.fonts.len()),
        ("OCR pages", set.ocr.len()),
    ];
    for (label, count) in rows.iter().filter(|(_, count)| *count > 0) {
        println!("  {}: {}", label.bold(), count);
    }
    if set.metadata.is_some() {
        println!("  {}: yes", "Metadata".bold());
    }
    if set.bookmarks.as_ref().is_some_and(|b| b.generate_from_headings) {
        println!("  {}: from headings", "Bookmarks".bold());
    }
    Ok(())
}

fn cmd_apply(
    input: &Path,
    instructions: &Path,
    output: Option<&Path>,
    options: InterpretOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let set = load_instructions(instructions)?;
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        input.with_file_name(format!("{}.remediated.pdf", stem))
    });

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));

    spinner.set_message("Reading PDF...");
    let pdf = fs::read(input)?;

    spinner.set_message("Applying instructions...");
    let result = remediate(&pdf, &set, options);
    spinner.finish_and_clear();
    let remediated = result?;

    fs::write(&output, &remediated)?;
    println!(
        "{} {} ({} bytes)",
        "Saved to".green(),
        output.display(),
        remediated.len()
    );
    Ok(())
}

fn cmd_inspect(
    input: &Path,
    output: Option<&Path>,
    compact: bool,
    font_programs: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let inspector = Inspector::new(InspectOptions::default().with_font_programs(font_programs));
    let report = inspector.inspect(&data)?;

    let format = if compact {
        JsonFormat::Compact
    } else {
        JsonFormat::Pretty
    };
    let json = to_json(&report, format)?;

    if let Some(path) = output {
        fs::write(path, &json)?;
        println!("{} {}", "Saved to".green(), path.display());
    } else {
        println!("{}", json);
    }
    Ok(())
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let report = Inspector::new(InspectOptions::default().with_content_operators(false))
        .inspect(&data)?;
    print_info(input, &report);
    Ok(())
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "Yes".green()
    } else {
        "No".red()
    }
}

fn print_info(input: &Path, report: &InspectionReport) {
    let document = &report.document;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: PDF {}", "Format".bold(), document.pdf_version);
    println!("{}: {}", "Pages".bold(), document.page_count);
    println!("{}: {} bytes", "Size".bold(), document.file_size_bytes);
    if let Some(title) = document.info.get("Title") {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(modified) = document.mod_date {
        println!("{}: {}", "Modified".bold(), modified.format("%Y-%m-%d %H:%M %:z"));
    }
    if let Some(processor) = document.info.get("Processor") {
        println!("{}: {}", "Processor".bold(), processor);
    }

    println!();
    println!("{}", "Accessibility".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Tagged".bold(), yes_no(document.tagged));
    println!(
        "{}: {}",
        "Language".bold(),
        document.language.as_deref().unwrap_or("(none)")
    );
    println!(
        "{}: {}",
        "Display title".bold(),
        yes_no(document.display_doc_title == Some(true))
    );
    match document.pdfua_part {
        Some(part) => println!("{}: {}", "PDF/UA part".bold(), part),
        None => println!("{}: {}", "PDF/UA part".bold(), "none".red()),
    }

    let elements = report
        .structure_tree
        .as_ref()
        .map_or(0, |tree| count_elements(&tree.children));
    println!("{}: {}", "Structure elements".bold(), elements);

    let missing_unicode = report.fonts.iter().filter(|f| !f.has_to_unicode).count();
    println!(
        "{}: {} ({} without ToUnicode)",
        "Fonts".bold(),
        report.fonts.len(),
        missing_unicode
    );

    let untagged: usize = report
        .pages
        .iter()
        .map(|page| page.mcids.len().saturating_sub(page.structured_mcids.len()))
        .sum();
    if untagged > 0 {
        println!(
            "{}: {}",
            "MCIDs without parent".bold(),
            untagged.to_string().yellow()
        );
    }
    println!("{}: {}", "Bookmarks".bold(), count_outlines(&report.outlines));

    let low_contrast = report
        .color_pairs
        .iter()
        .filter(|pair| pair.contrast_ratio < 4.5)
        .count();
    if low_contrast > 0 {
        println!(
            "{}: {}",
            "Low contrast pairs".bold(),
            low_contrast.to_string().yellow()
        );
    }
}

fn count_elements(elements: &[pdfremedy::inspect::StructureElementReport]) -> usize {
    elements
        .iter()
        .map(|element| 1 + count_elements(&element.children))
        .sum()
}

fn count_outlines(items: &[pdfremedy::inspect::OutlineReport]) -> usize {
    items
        .iter()
        .map(|item| 1 + count_outlines(&item.children))
        .sum()
}
