use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// A 0-100 score, green from 70 and red below 40.
pub fn color_coded_score_cell(score: f64) -> Cell {
    let text = format!("{score:.1}");
    if score >= 70.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if score >= 40.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn rank_cell(position: usize) -> Cell {
    let cell = Cell::new(position);
    match position {
        1 => cell.fg(TableColor::Yellow),
        2 | 3 => cell.fg(TableColor::White),
        _ => cell.fg(TableColor::DarkGrey),
    }
}
