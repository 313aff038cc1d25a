/* ZIP Writer — builds a store-only (uncompressed) ZIP archive in memory.
 * No external `zip` crate: the page assembler needs byte-exact control over
 * entry order and the `dummy.txt` padding entry to satisfy the forbidden-
 * byte invariant, so the writer is hand-rolled, the same way the teacher
 * hand-rolls HID++ report layout instead of reaching for a generic codec. */

use crc::{Crc, CRC_32_ISO_HDLC};

const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
const CENTRAL_FILE_HEADER_SIG: u32 = 0x0201_4B50;
const EOCD_SIG: u32 = 0x0605_4B50;
const VERSION_NEEDED: u16 = 20;
const VERSION_MADE_BY: u16 = 20;
const METHOD_STORE: u16 = 0;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One entry to be written into the archive: a name and its raw bytes.
/// Stored, never compressed.
pub struct ZipEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
}

struct CentralRecord {
    name: String,
    crc32: u32,
    size: u32,
    offset: u32,
}

/// Write a store-only ZIP archive containing `entries` in order. Timestamps
/// are zeroed, no extra fields or comments are emitted, and the central
/// directory is written in the same order entries were inserted.
pub fn write_zip(entries: &[ZipEntry<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::with_capacity(entries.len());

    for entry in entries {
        let offset = out.len() as u32;
        let crc32 = CRC32.checksum(entry.data);
        let size = entry.data.len() as u32;
        let name_bytes = entry.name.as_bytes();

        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
        out.extend_from_slice(&METHOD_STORE.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // last mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // last mod date
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes()); // compressed size
        out.extend_from_slice(&size.to_le_bytes()); // uncompressed size
        out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(entry.data);

        central.push(CentralRecord {
            name: entry.name.to_string(),
            crc32,
            size,
            offset,
        });
    }

    let central_dir_offset = out.len() as u32;

    for rec in &central {
        let name_bytes = rec.name.as_bytes();
        out.extend_from_slice(&CENTRAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
        out.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
        out.extend_from_slice(&METHOD_STORE.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // last mod time
        out.extend_from_slice(&0u16.to_le_bytes()); // last mod date
        out.extend_from_slice(&rec.crc32.to_le_bytes());
        out.extend_from_slice(&rec.size.to_le_bytes());
        out.extend_from_slice(&rec.size.to_le_bytes());
        out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        out.extend_from_slice(&0u16.to_le_bytes()); // comment length
        out.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&rec.offset.to_le_bytes());
        out.extend_from_slice(name_bytes);
    }

    let central_dir_size = out.len() as u32 - central_dir_offset;

    out.extend_from_slice(&EOCD_SIG.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // disk number
    out.extend_from_slice(&0u16.to_le_bytes()); // disk with central dir
    out.extend_from_slice(&(central.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u16).to_le_bytes());
    out.extend_from_slice(&central_dir_size.to_le_bytes());
    out.extend_from_slice(&central_dir_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // comment length

    out
}

/// A local-file-header entry parsed back out of a store-only archive, used
/// when re-packaging an externally supplied ZIP (see `page::repackage`).
pub struct ParsedEntry {
    pub name: String,
    pub data: Vec<u8>,
}

/// Parse the local file headers of a store-only ZIP (no general-purpose
/// flags, method 0). Ignores the central directory and EOCD entirely —
/// they're redundant with the local headers for this restricted subset.
pub fn parse_store_only(buf: &[u8]) -> Option<Vec<ParsedEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos + 4 <= buf.len() {
        let sig = u32::from_le_bytes(buf[pos..pos + 4].try_into().ok()?);
        if sig != LOCAL_FILE_HEADER_SIG {
            break;
        }
        if pos + 30 > buf.len() {
            return None;
        }

        let method = u16::from_le_bytes(buf[pos + 8..pos + 10].try_into().ok()?);
        let size = u32::from_le_bytes(buf[pos + 18..pos + 22].try_into().ok()?) as usize;
        let name_len = u16::from_le_bytes(buf[pos + 26..pos + 28].try_into().ok()?) as usize;
        let extra_len = u16::from_le_bytes(buf[pos + 28..pos + 30].try_into().ok()?) as usize;

        if method != METHOD_STORE as u16 {
            return None;
        }

        let name_start = pos + 30;
        let data_start = name_start + name_len + extra_len;
        let data_end = data_start + size;
        if data_end > buf.len() {
            return None;
        }

        let name = String::from_utf8(buf[name_start..name_start + name_len].to_vec()).ok()?;
        let data = buf[data_start..data_end].to_vec();
        entries.push(ParsedEntry { name, data });

        pos = data_end;
    }

    Some(entries)
}
