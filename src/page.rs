/* Page Assembler — combines icons and the manifest into a single ZIP
 * buffer, searching for a `dummy.txt` pad length that satisfies the
 * forbidden-byte invariant before falling back to force-patching. */

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::manifest::{build_manifest, IconItem};
use crate::mitigate::{force_patch, satisfies_invariant, SAFE_BYTE};
use crate::zip::{parse_store_only, write_zip, ZipEntry};

pub const DEFAULT_PAD_CAP: usize = 4096;
const DUMMY_NAME: &str = "dummy.txt";

#[derive(Debug, Error)]
pub enum PageError {
    #[error("no icons given")]
    Empty,
    #[error("supplied archive is not a store-only ZIP this daemon can re-package")]
    UnsupportedArchive,
}

/// Result of assembling (or re-packaging) a page archive.
pub struct Page {
    pub buffer: Vec<u8>,
    pub pad_used: usize,
    pub patched: usize,
}

fn dummy_entry(pad: usize) -> Vec<u8> {
    vec![SAFE_BYTE; pad]
}

/// Build a page archive from an ordered list of icons, per §4.5: try
/// increasing `dummy.txt` pad lengths until the forbidden-byte invariant
/// holds, then fall back to force-patching at the cap.
pub fn assemble(
    items: &[IconItem],
    pad_cap: usize,
    fast_no_pad: bool,
) -> Result<Page, PageError> {
    if items.is_empty() {
        return Err(PageError::Empty);
    }

    let manifest_json = build_manifest(items);
    let icon_paths: Vec<String> = items.iter().map(IconItem::archive_path).collect();

    let build_with_pad = |pad: usize| -> Vec<u8> {
        let dummy_data;
        let mut entries = Vec::with_capacity(items.len() + 2);
        if pad > 0 {
            dummy_data = dummy_entry(pad);
            entries.push(ZipEntry {
                name: DUMMY_NAME,
                data: &dummy_data,
            });
        }
        entries.push(ZipEntry {
            name: "manifest.json",
            data: manifest_json.as_bytes(),
        });
        for (item, path) in items.iter().zip(icon_paths.iter()) {
            entries.push(ZipEntry {
                name: path,
                data: &item.icon_bytes,
            });
        }
        write_zip(&entries)
    };

    let cap = if fast_no_pad { 0 } else { pad_cap };

    for pad in 0..=cap {
        let candidate = build_with_pad(pad);
        if satisfies_invariant(&candidate) {
            debug!(pad, "page satisfies forbidden-byte invariant");
            return Ok(Page {
                buffer: candidate,
                pad_used: pad,
                patched: 0,
            });
        }
        if fast_no_pad {
            break;
        }
    }

    let mut candidate = build_with_pad(cap);
    let patched = force_patch(&mut candidate);
    info!(pad = cap, patched, "page required force-patch fallback");
    Ok(Page {
        buffer: candidate,
        pad_used: cap,
        patched,
    })
}

/// Re-package an externally supplied store-only ZIP: parse its local
/// headers, preserve every entry in its original order, and shift the whole
/// archive behind a fresh `dummy.txt` pad sized to satisfy the
/// forbidden-byte invariant.
pub fn repackage(
    existing: &[u8],
    pad_cap: usize,
    fast_no_pad: bool,
) -> Result<Page, PageError> {
    let parsed = parse_store_only(existing).ok_or(PageError::UnsupportedArchive)?;
    if parsed.is_empty() {
        warn!("re-packaged archive has no entries");
    }

    let build_with_pad = |pad: usize| -> Vec<u8> {
        let dummy_data;
        let mut entries = Vec::with_capacity(parsed.len() + 1);
        if pad > 0 {
            dummy_data = dummy_entry(pad);
            entries.push(ZipEntry {
                name: DUMMY_NAME,
                data: &dummy_data,
            });
        }
        entries.extend(parsed.iter().map(|e| ZipEntry {
            name: &e.name,
            data: &e.data,
        }));
        write_zip(&entries)
    };

    let cap = if fast_no_pad { 0 } else { pad_cap };

    for pad in 0..=cap {
        let candidate = build_with_pad(pad);
        if satisfies_invariant(&candidate) {
            return Ok(Page {
                buffer: candidate,
                pad_used: pad,
                patched: 0,
            });
        }
        if fast_no_pad {
            break;
        }
    }

    let mut candidate = build_with_pad(cap);
    let patched = force_patch(&mut candidate);
    info!(pad = cap, patched, "re-packaged page required force-patch fallback");
    Ok(Page {
        buffer: candidate,
        pad_used: cap,
        patched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icon(idx: u32, bytes: &[u8]) -> IconItem {
        IconItem {
            button_index: idx,
            file_name: format!("b{idx}.png"),
            label: Some(format!("L{idx}")),
            icon_bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn empty_item_list_is_an_error() {
        assert!(matches!(assemble(&[], DEFAULT_PAD_CAP, false), Err(PageError::Empty)));
    }

    #[test]
    fn assembled_page_satisfies_invariant_or_reports_patch() {
        let items = vec![icon(0, b"PNG1"), icon(1, b"PNG2")];
        let page = assemble(&items, DEFAULT_PAD_CAP, false).unwrap();
        assert!(satisfies_invariant(&page.buffer) || page.patched > 0);
    }

    #[test]
    fn already_safe_page_uses_zero_pad() {
        let items = vec![icon(0, b"tiny")];
        let page = assemble(&items, DEFAULT_PAD_CAP, false).unwrap();
        assert_eq!(page.pad_used, 0);
        assert_eq!(page.patched, 0);
    }

    #[test]
    fn single_button_14_manifest_uses_cell_3_2() {
        let items = vec![IconItem {
            button_index: 13,
            file_name: "status.png".into(),
            label: Some("ignored".into()),
            icon_bytes: b"ICON".to_vec(),
        }];
        let page = assemble(&items, DEFAULT_PAD_CAP, false).unwrap();
        let parsed = parse_store_only(&page.buffer).unwrap();
        let manifest = parsed.iter().find(|e| e.name == "manifest.json").unwrap();
        let json = String::from_utf8(manifest.data.clone()).unwrap();
        assert!(json.contains("\"3_2\""));
        assert!(json.contains(r#""Text":"""#));
    }

    #[test]
    fn repackage_preserves_entry_order_behind_dummy() {
        let original = write_zip(&[
            ZipEntry {
                name: "manifest.json",
                data: b"{}",
            },
            ZipEntry {
                name: "icons/a.png",
                data: b"AAA",
            },
        ]);
        let page = repackage(&original, DEFAULT_PAD_CAP, false).unwrap();
        let parsed = parse_store_only(&page.buffer).unwrap();
        let names: Vec<_> = parsed.iter().map(|e| e.name.clone()).collect();
        if page.pad_used > 0 {
            assert_eq!(names, vec!["dummy.txt", "manifest.json", "icons/a.png"]);
        } else {
            assert_eq!(names, vec!["manifest.json", "icons/a.png"]);
        }
    }

    #[test]
    fn repackage_rejects_non_zip_input() {
        assert!(matches!(
            repackage(b"not a zip", DEFAULT_PAD_CAP, false),
            Err(PageError::UnsupportedArchive)
        ));
    }

    #[test]
    fn fast_no_pad_skips_search_and_patches_directly() {
        let items = vec![icon(0, b"x")];
        let page = assemble(&items, DEFAULT_PAD_CAP, true).unwrap();
        assert_eq!(page.pad_used, 0);
        assert!(satisfies_invariant(&page.buffer));
    }
}
