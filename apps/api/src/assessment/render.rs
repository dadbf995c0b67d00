//! Report rendering. The pipeline only needs a write-only sink; the HTML renderer is one
//! implementation of it.

use std::path::Path;

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext};
use thiserror::Error;
use tracing::info;

use crate::assessment::report::EnrichedReport;
use crate::errors::AppError;

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/report.hbs");
const TEMPLATE_NAME: &str = "report";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("could not write report: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ReportRenderer: Send + Sync {
    /// Writes a human-readable rendering of `report` to `path`.
    fn render(&self, report: &EnrichedReport, path: &Path) -> Result<(), RenderError>;
}

pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

impl HandlebarsRenderer {
    /// Uses the embedded template unless a source is supplied.
    pub fn new(template: Option<&str>) -> Result<Self, AppError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_helper("format_key", Box::new(format_key_helper));
        handlebars.register_helper("mul", Box::new(mul_helper));
        handlebars.register_helper("pct", Box::new(pct_helper));
        handlebars
            .register_template_string(TEMPLATE_NAME, template.unwrap_or(DEFAULT_TEMPLATE))
            .map_err(|e| AppError::Configuration(format!("invalid report template: {e}")))?;
        Ok(Self { handlebars })
    }

    /// Reads the template override from disk. An unreadable file is a configuration error.
    pub fn from_file(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            None => Self::new(None),
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Configuration(format!("cannot read template {}: {e}", path.display()))
                })?;
                Self::new(Some(&source))
            }
        }
    }

    pub fn render_to_string(&self, report: &EnrichedReport) -> Result<String, RenderError> {
        Ok(self.handlebars.render(TEMPLATE_NAME, report)?)
    }
}

impl ReportRenderer for HandlebarsRenderer {
    fn render(&self, report: &EnrichedReport, path: &Path) -> Result<(), RenderError> {
        let html = self.render_to_string(report)?;
        std::fs::write(path, html)?;
        info!("HTML report generated: {}", path.display());
        Ok(())
    }
}

/// `craniovertebral_angle` → `Craniovertebral Angle`
pub fn format_key(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// Handlebars helpers

fn format_key_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&format_key(param))?;
    Ok(())
}

fn mul_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let a = h.param(0).and_then(|v| v.value().as_f64()).unwrap_or(0.0);
    let b = h.param(1).and_then(|v| v.value().as_f64()).unwrap_or(0.0);
    out.write(&(a * b).to_string())?;
    Ok(())
}

fn pct_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let fraction = h.param(0).and_then(|v| v.value().as_f64()).unwrap_or(0.0);
    out.write(&format!("{:.0}", (fraction * 100.0).clamp(0.0, 100.0)))?;
    Ok(())
}
