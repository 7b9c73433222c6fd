//! Read-structure extraction from RunInfo.xml.
//!
//! The instrument writes `<Reads><Read NumCycles="151" IsIndexedRead="N"/>
//! ...</Reads>` at the run root; rendering those elements in order yields
//! the canonical read-structure string (`"151T8B151T"`). Indexed reads map
//! to barcodes, everything else to template.

use std::path::Path;
use std::{fs::File, io::Read};

use crate::LaneDirError;

const READ_TAG: &str = "Read";
const NUM_CYCLES_ATTR: &str = "NumCycles";
const INDEXED_ATTR: &str = "IsIndexedRead";

pub fn read_structure_from_run_info<P: AsRef<Path>>(path: P) -> Result<String, LaneDirError> {
    let mut handle = File::open(&path)?;
    let mut raw_contents = String::new();
    handle.read_to_string(&mut raw_contents)?;
    let doc = roxmltree::Document::parse(&raw_contents)
        .map_err(|e| LaneDirError::BadRunInfo(format!("not parseable as XML: {e}")))?;

    let mut out = String::new();
    for node in doc.descendants().filter(|n| n.has_tag_name(READ_TAG)) {
        let cycles: u32 = match node.attribute(NUM_CYCLES_ATTR) {
            None => {
                return Err(LaneDirError::BadRunInfo(format!(
                    "Read element missing {NUM_CYCLES_ATTR}"
                )))
            }
            Some(raw) => raw.parse().map_err(|_| {
                LaneDirError::BadRunInfo(format!("{NUM_CYCLES_ATTR} is not a number: {raw}"))
            })?,
        };
        let code = match node.attribute(INDEXED_ATTR) {
            Some("Y") => 'B',
            _ => 'T',
        };
        out.push_str(&format!("{cycles}{code}"));
    }
    if out.is_empty() {
        return Err(LaneDirError::BadRunInfo("no Read elements".to_string()));
    }
    Ok(out)
}
