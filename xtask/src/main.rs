//! Build automation tasks for DEX
//!
//! This tool provides various automation tasks for the DEX project, including:
//! - Generating CLI documentation from source code
//! - Future build-related tasks

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for DEX", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate CLI documentation in MDX format
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs/content")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    // Generate markdown from clap definitions
    let markdown = clap_markdown::help_markdown::<dex_cli::Cli>();

    // Create MDX content with frontmatter and enhanced formatting
    let mdx_content = format!(
        r#"---
title: CLI Reference
description: Complete command reference for the DEX CLI
---

# DEX CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

DEX (Dataset Export Pipeline) turns a published dataset into downloadable
files: it streams the dataset lines, writes every requested tabular and
geographic format, and registers the results as attachments on the dataset
page.

## Installation

### From Source

```bash
git clone https://github.com/datadir-lab/dex.git
cd dex
cargo install --path crates/dex-cli
```

### External Tools

The geographic formats are derived with external converters that must be on
the `PATH` (or pointed at explicitly):

- `ogr2ogr` (GDAL) for GeoJSON, Shapefile and GeoPackage conversion
- `tippecanoe` for PMTiles vector tiles

## Quick Start

```bash
# Check a processing configuration without running anything
dex validate --config processing.json

# Run the export described by the configuration
dex run --config processing.json --api-key "$DEX_API_KEY"

# Keep intermediate files somewhere specific
dex run --config processing.json --tmp-dir /var/tmp/dex
```

## Commands

{}

## Environment Variables

- `DEX_API_KEY` - API key sent to the dataset platform (`x-apiKey` header)
- `DEX_HTTP_TIMEOUT_SECS` - Per-request HTTP timeout (default: `300`)
- `DEX_OGR2OGR_BIN` - Path to the `ogr2ogr` binary (default: `ogr2ogr`)
- `DEX_TIPPECANOE_BIN` - Path to the `tippecanoe` binary (default: `tippecanoe`)
- `LOG_LEVEL` / `LOG_OUTPUT` / `LOG_FORMAT` - Logging overrides (see `dex-common`)

## Configuration

DEX reads a `processing.json` file describing one export. Example:

```json
{{
  "dataset": {{
    "href": "https://data.example.com/api/v1/datasets/capitales"
  }},
  "fields": [
    {{ "key": "insee_dep", "type": "string" }},
    {{ "key": "population", "type": "integer" }}
  ],
  "format": ["csv", "parquet", "geojson"],
  "filters": [
    {{ "type": "in", "field": {{ "key": "insee_dep" }}, "values": ["35", "56"] }}
  ],
  "label": "Fichiers exports",
  "filename": "export"
}}
```

Leave `fields` empty to export the full dataset schema (calculated columns
excluded). Geographic formats additionally need a geo concept (latitude/
longitude or a geometry column) tagged in the dataset schema.

## Examples

### Tabular Exports

```bash
# CSV + Parquet + Excel from the same pass over the data
dex validate --config processing.json
dex run --config processing.json
```

### Geographic Exports

```bash
# GeoJSON and PMTiles derived from the staged CSV
dex run --config geo-processing.json

# Point the pipeline at a specific GDAL build
DEX_OGR2OGR_BIN=/opt/gdal/bin/ogr2ogr dex run --config geo-processing.json
```

## Support

- GitHub Issues: https://github.com/datadir-lab/dex/issues

---

*This documentation is automatically generated from the CLI source code. To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    // Create output directory if it doesn't exist
    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    // Write the MDX file
    let file_path = output_path.join("cli-reference.mdx");
    fs::write(&file_path, mdx_content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Review the generated documentation");
    println!("  2. Commit it to version control");
    println!("  3. Add a CI check to ensure docs stay in sync");

    Ok(())
}
