//! Matrix command - print the solver dispatch matrix
//!
//! One row per local situation, one column per remote situation. Unassigned
//! cells show `-` and make the command report the matrix as incomplete.

use anyhow::Result;
use clap::Args;
use cmisync_core::domain::SituationType;
use cmisync_sync::solver::SolverMatrix;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct MatrixCommand {}

impl MatrixCommand {
    pub async fn execute(&self, format: OutputFormat) -> Result<()> {
        let matrix = SolverMatrix::standard();
        let formatter = get_formatter(format);

        if format.is_json() {
            formatter.print_json(&matrix_json(&matrix));
            return Ok(());
        }

        for line in render_table(&matrix) {
            println!("{line}");
        }
        println!();
        if matrix.is_complete() {
            formatter.success("Every situation pair has a solver");
        } else {
            formatter.error(&format!(
                "{} situation pair(s) have no solver",
                matrix.missing_cells().len()
            ));
        }
        Ok(())
    }
}

fn cell(matrix: &SolverMatrix, local: SituationType, remote: SituationType) -> String {
    matrix
        .get(local, remote)
        .map(|key| key.name().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn render_table(matrix: &SolverMatrix) -> Vec<String> {
    let header_label = "local \\ remote";
    let first_width = SituationType::ALL
        .iter()
        .map(|s| s.to_string().len())
        .chain(std::iter::once(header_label.len()))
        .max()
        .unwrap_or(0);
    let widths: Vec<usize> = SituationType::ALL
        .iter()
        .map(|&remote| {
            SituationType::ALL
                .iter()
                .map(|&local| cell(matrix, local, remote).len())
                .chain(std::iter::once(remote.to_string().len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(SituationType::COUNT + 1);
    let mut header = format!("{:<first_width$}", header_label);
    for (remote, width) in SituationType::ALL.iter().zip(&widths) {
        header.push_str(&format!("  {:<width$}", remote.to_string(), width = *width));
    }
    lines.push(header.trim_end().to_string());

    for local in SituationType::ALL {
        let mut row = format!("{:<first_width$}", local.to_string());
        for (&remote, width) in SituationType::ALL.iter().zip(&widths) {
            row.push_str(&format!("  {:<width$}", cell(matrix, local, remote), width = *width));
        }
        lines.push(row.trim_end().to_string());
    }
    lines
}

fn matrix_json(matrix: &SolverMatrix) -> serde_json::Value {
    let cells: Vec<serde_json::Value> = SituationType::ALL
        .iter()
        .flat_map(|&local| SituationType::ALL.iter().map(move |&remote| (local, remote)))
        .map(|(local, remote)| {
            serde_json::json!({
                "local": local.to_string(),
                "remote": remote.to_string(),
                "solver": matrix.get(local, remote).map(|key| key.name()),
            })
        })
        .collect();
    serde_json::json!({
        "complete": matrix.is_complete(),
        "cells": cells,
    })
}
