//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kurbo::Point;
use pagemark_core::{PageIndex, SerializableColor};

#[derive(Parser, Debug)]
#[command(name = "pagemark", version, about = "Annotate PDF pages and export merged copies")]
pub struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage directory for artifacts and attachments.
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show page count and display sizes of a document
    Inspect(DocumentArgs),
    /// Draw or erase one stroke on a page and save the overlay store
    Annotate(AnnotateArgs),
    /// Remove every mark from a page
    Clear(PageArgs),
    /// Write a page with its overlay as PNG
    Preview(PreviewArgs),
    /// Merge overlays into the document and store the result
    Export(ExportArgs),
    /// List artifacts recorded for a record
    Artifacts(RecordArgs),
    /// Upload submission attachments
    Upload(UploadArgs),
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Path or file:// URL of the PDF
    pub document: String,
}

#[derive(Args, Debug)]
pub struct PageArgs {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Overlay store (JSON); created when missing
    #[arg(long)]
    pub store: PathBuf,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    pub page: PageIndex,
}

#[derive(Args, Debug)]
pub struct AnnotateArgs {
    #[command(flatten)]
    pub target: PageArgs,

    /// Stroke points in display pixels, e.g. `10,10 80,40 120,35`
    #[arg(long, num_args = 2.., value_parser = parse_point, required = true)]
    pub points: Vec<Point>,

    /// Stroke color as #rrggbb or #rrggbbaa
    #[arg(long, value_parser = parse_color)]
    pub color: Option<SerializableColor>,

    /// Stroke width in display pixels
    #[arg(long)]
    pub width: Option<f64>,

    /// Erase instead of marking
    #[arg(long)]
    pub erase: bool,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub target: PageArgs,

    /// Output PNG
    #[arg(long, short)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub document: DocumentArgs,

    /// Record the artifact is attached to
    #[arg(long)]
    pub record: String,

    /// Overlay store (JSON)
    #[arg(long, conflicts_with = "overlays", required_unless_present = "overlays")]
    pub store: Option<PathBuf>,

    /// Directory of `page-<n>.png` overlays
    #[arg(long)]
    pub overlays: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Record id
    pub record: String,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Record the files belong to
    #[arg(long)]
    pub record: String,

    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn parse_point(value: &str) -> Result<Point, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{}'", value))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad x in '{}': {}", value, e))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad y in '{}': {}", value, e))?;
    Ok(Point::new(x, y))
}

pub fn parse_color(value: &str) -> Result<SerializableColor, String> {
    SerializableColor::from_hex(value).ok_or_else(|| format!("invalid color '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("10,20.5").unwrap(), Point::new(10.0, 20.5));
        assert_eq!(parse_point(" 3 , 4 ").unwrap(), Point::new(3.0, 4.0));
        assert!(parse_point("10").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#000000").unwrap(), SerializableColor::black());
        assert!(parse_color("blue").is_err());
    }

    #[test]
    fn test_annotate_args() {
        let cli = Cli::try_parse_from([
            "pagemark", "annotate", "essay.pdf", "--store", "s.json", "--page", "2", "--points", "1,1", "5,5",
            "--erase",
        ])
        .unwrap();
        let Commands::Annotate(args) = cli.command else {
            panic!("expected annotate");
        };
        assert_eq!(args.target.page, 2);
        assert_eq!(args.points.len(), 2);
        assert!(args.erase);
    }

    #[test]
    fn test_export_requires_overlays_source() {
        assert!(Cli::try_parse_from(["pagemark", "export", "essay.pdf", "--record", "7"]).is_err());
        assert!(Cli::try_parse_from(["pagemark", "export", "essay.pdf", "--record", "7", "--store", "s.json"]).is_ok());
    }
}
