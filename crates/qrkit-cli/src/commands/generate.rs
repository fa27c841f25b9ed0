//! Generate command
//!
//! Composes a QR code from text, optionally overlays a logo, writes a preview,
//! and exports in the requested formats.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use qrkit_core::config::DEFAULT_LOGO_FRACTION;
use qrkit_core::services::encode_png;
use qrkit_core::{Error, ExportFormat, GenerateInput, HexColor, PreviewState, Studio};

use super::{resolve_out_dir, Context};
use crate::output::{print_error, print_info, print_output, print_success, print_warning};

#[derive(Args)]
pub struct GenerateArgs {
    /// Text or URL to encode
    pub text: String,

    /// Module color (#rrggbb or #rgb)
    #[arg(long, default_value = "#000000")]
    pub dark: String,

    /// Background color (#rrggbb or #rgb)
    #[arg(long, default_value = "#ffffff")]
    pub light: String,

    /// Logo image to place in the center
    #[arg(long)]
    pub logo: Option<PathBuf>,

    /// Logo edge as a percentage of the QR width (up to 50)
    #[arg(long, default_value_t = DEFAULT_LOGO_FRACTION * 100.0)]
    pub logo_size: f32,

    /// Export format: png, svg or pdf (repeatable)
    #[arg(long = "export", value_name = "FORMAT")]
    pub exports: Vec<ExportFormat>,

    /// Write the down-scaled preview PNG to this path
    #[arg(long)]
    pub preview: Option<PathBuf>,

    /// Directory for exported files (default: Downloads)
    #[arg(long)]
    pub out: Option<String>,
}

/// One export result for display
#[derive(Debug, Serialize, Tabled)]
pub struct ExportRow {
    #[tabled(rename = "Format")]
    pub format: String,
    #[tabled(rename = "Produced")]
    pub produced: String,
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
}

pub async fn execute(ctx: &Context, args: GenerateArgs) -> Result<()> {
    let input = GenerateInput {
        text: args.text.clone(),
        dark: HexColor::parse_or(&args.dark, HexColor::BLACK)?,
        light: HexColor::parse_or(&args.light, HexColor::WHITE)?,
        logo_fraction: args.logo_size / 100.0,
    };

    let studio = ctx.studio(resolve_out_dir(args.out.as_deref()))?;
    studio.set_input(input).await?;

    let preview = match compose(ctx, &studio, args.logo.as_ref()).await? {
        Some(preview) => preview,
        None => return Ok(()),
    };

    let Some(artifact) = preview.artifact() else {
        print_info("Nothing to encode.", ctx.quiet);
        return Ok(());
    };
    print_success(
        &format!(
            "Composed {}x{} QR code{}",
            artifact.surface.width(),
            artifact.surface.height(),
            if artifact.has_logo { " with logo" } else { "" }
        ),
        ctx.quiet,
    );

    if let Some(path) = &args.preview {
        let bytes = encode_png(&artifact.preview)?;
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("Failed to write preview to {}", path.display()))?;
        print_info(&format!("Preview written to {}", path.display()), ctx.quiet);
    }

    if args.exports.is_empty() {
        return Ok(());
    }
    export_all(ctx, &studio, &args.exports).await
}

/// Load the logo (if any) and compose; `None` when there is nothing to show
async fn compose(
    ctx: &Context,
    studio: &Studio,
    logo: Option<&PathBuf>,
) -> Result<Option<PreviewState>> {
    let result = match logo {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read logo {}", path.display()))?;
            match studio.set_logo(Some(bytes)).await {
                Err(Error::AssetDecodeFailure(reason)) => {
                    print_warning(&format!("Logo ignored: {}", reason));
                    Ok(studio.current().await)
                }
                other => other,
            }
        }
        None => studio.generate().await,
    };

    match result {
        Ok(PreviewState::Empty) | Err(Error::InputEmpty) => {
            print_info("Nothing to encode.", ctx.quiet);
            Ok(None)
        }
        Ok(preview) => Ok(Some(preview)),
        Err(e) => Err(e.into()),
    }
}

async fn export_all(ctx: &Context, studio: &Studio, formats: &[ExportFormat]) -> Result<()> {
    let mut rows = Vec::new();

    for &format in formats {
        match studio.export_as(format).await {
            Ok(outcome) => {
                for notice in &outcome.notices {
                    print_warning(&notice.to_string());
                }
                rows.push(ExportRow {
                    format: outcome.requested.to_string(),
                    produced: outcome.produced.to_string(),
                    file: outcome.location,
                    remaining: outcome.quota.remaining.to_string(),
                });
            }
            Err(e @ Error::QuotaExceeded { .. }) => {
                if !rows.is_empty() {
                    print_output(&rows, ctx.format)?;
                }
                print_error(&e.to_string());
                print_info("Switch plans with `qrkit plan set <PLAN>`.", ctx.quiet);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    print_output(&rows, ctx.format)
}
