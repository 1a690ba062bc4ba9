use uberproc_core::driver::RunSummary;

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// One row per file the run kept or reused.
pub fn summary_rows(summary: &RunSummary) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = summary
        .kept
        .iter()
        .map(|f| {
            let status = if summary.reused.contains(f) {
                "reused"
            } else {
                "kept"
            };
            vec![status.to_string(), f.display().to_string()]
        })
        .collect();
    rows.extend(
        summary
            .reused
            .iter()
            .filter(|f| !summary.kept.contains(f))
            .map(|f| vec!["reused".to_string(), f.display().to_string()]),
    );
    rows
}

pub fn print_summary(summary: &RunSummary) {
    let rows = summary_rows(summary);
    if !rows.is_empty() {
        print_table(&["STATUS", "FILE"], rows);
    }
    println!(
        "{} program run(s), {} intermediate file(s) removed",
        summary.invocations,
        summary.deleted.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn reused_products_are_marked() {
        let summary = RunSummary {
            invocations: 1,
            reused: vec![PathBuf::from("a.L1A_LAC"), PathBuf::from("a.GEO")],
            kept: vec![PathBuf::from("a.L1A_LAC"), PathBuf::from("a.L1B_LAC")],
            deleted: vec![],
        };
        let rows = summary_rows(&summary);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ["reused", "a.L1A_LAC"]);
        assert_eq!(rows[1], ["kept", "a.L1B_LAC"]);
        assert_eq!(rows[2], ["reused", "a.GEO"]);
    }
}
