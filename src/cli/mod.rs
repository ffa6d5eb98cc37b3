//! Terminal output helpers for the `smartrental` binary.

use crate::identity::SessionSnapshot;
use crate::routes::{Access, RouteTable};

const MAX_COL_WIDTH: usize = 60;

/// Render rows as an ASCII table. Returns an empty string when there are no rows.
pub fn render_table(cols: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() { return String::new(); }
    let mut widths: Vec<usize> = cols.iter().map(|c| c.chars().count().min(MAX_COL_WIDTH)).collect();
    for r in rows {
        for (i, cell) in r.iter().enumerate().take(cols.len()) {
            widths[i] = widths[i].max(cell.chars().count().min(MAX_COL_WIDTH));
        }
    }
    let sep = build_separator(&widths);
    let header: Vec<String> = cols.iter().map(|c| c.to_string()).collect();
    let mut out = Vec::with_capacity(rows.len() + 4);
    out.push(sep.clone());
    out.push(build_row(&header, &widths));
    out.push(sep.clone());
    for r in rows {
        out.push(build_row(r, &widths));
    }
    out.push(sep);
    out.join("\n")
}

pub fn routes_table(routes: &RouteTable) -> String {
    let rows: Vec<Vec<String>> = routes
        .entries()
        .iter()
        .map(|e| {
            let access = match &e.access {
                Access::Public => "public".to_string(),
                Access::Protected(c) => c.to_string(),
            };
            vec![e.pattern.clone(), access]
        })
        .collect();
    render_table(&["path", "requires"], &rows)
}

pub fn session_table(snapshot: &SessionSnapshot) -> String {
    let mut rows = vec![
        vec!["state".to_string(), format!("{:?}", snapshot.state).to_lowercase()],
        vec!["generation".to_string(), snapshot.generation.to_string()],
    ];
    match &snapshot.identity {
        Some(user) => {
            rows.push(vec!["user".to_string(), user.label().to_string()]);
            rows.push(vec!["id".to_string(), user.id.clone()]);
            rows.push(vec!["role".to_string(), user.role.to_string()]);
        }
        None => rows.push(vec!["user".to_string(), "(anonymous)".to_string()]),
    }
    render_table(&["field", "value"], &rows)
}

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = w.saturating_sub(text.chars().count());
        s.push(' ');
        if is_numeric_like(cell) {
            s.push_str(&" ".repeat(pad));
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&" ".repeat(pad));
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    !st.is_empty() && st.chars().all(|c| c.is_ascii_digit())
}
