/* Manifest Builder — produces the `manifest.json` document that maps grid
 * cells to icon file names and labels. */

/// Number of columns in the button grid.
pub const GRID_COLS: usize = 5;
/// Index of the double-wide status tile (bottom-right).
pub const STATUS_BUTTON_INDEX: u32 = 13;

/// One icon to place on the grid.
#[derive(Debug, Clone)]
pub struct IconItem {
    pub button_index: u32,
    pub file_name: String,
    pub label: Option<String>,
    pub icon_bytes: Vec<u8>,
}

impl IconItem {
    /// The archive-relative path this icon's bytes are stored under.
    pub fn archive_path(&self) -> String {
        format!("icons/{}", self.file_name)
    }

    fn label_text(&self) -> String {
        if self.button_index == STATUS_BUTTON_INDEX {
            return String::new();
        }
        self.label
            .as_deref()
            .unwrap_or("")
            .replace('"', "")
    }
}

/// Grid cell key for a button index: `"<col>_<row>"`.
pub fn cell_key(button_index: u32) -> String {
    let col = button_index % GRID_COLS as u32;
    let row = button_index / GRID_COLS as u32;
    format!("{col}_{row}")
}

/// Build the compact JSON manifest for an ordered set of icon items.
/// Only buttons present in `items` get an entry.
pub fn build_manifest(items: &[IconItem]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let key = cell_key(item.button_index);
        let icon = item.archive_path();
        let text = item.label_text();
        out.push_str(&format!(
            "\"{key}\":{{\"State\":0,\"ViewParam\":[{{\"Icon\":\"{icon}\",\"Text\":\"{text}\"}}]}}"
        ));
    }
    out.push('}');
    out
}
