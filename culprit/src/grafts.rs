use std::collections::HashMap;
use std::path::Path;

use gix::ObjectId;

use crate::error::Result;

/// Read ancestry overrides from a grafts-style file: one commit per line,
/// `child parent1 parent2 …`, all in full hex. Blank lines and `#` comments
/// are skipped.
pub fn read_ancestry(path: &Path) -> Result<HashMap<ObjectId, Vec<ObjectId>>> {
    parse(&std::fs::read_to_string(path)?)
}

fn parse(text: &str) -> Result<HashMap<ObjectId, Vec<ObjectId>>> {
    let mut ancestry = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut ids = line.split_ascii_whitespace();
        let child = ObjectId::from_hex(ids.next().expect("split of non-empty line").as_bytes())?;
        let parents = ids
            .map(|id| ObjectId::from_hex(id.as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ancestry.insert(child, parents);
    }
    Ok(ancestry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "cccccccccccccccccccccccccccccccccccccccc";

    #[test]
    fn parses_children_and_parents() {
        let text = format!("# a graft\n\n{A} {B} {C}\n{B}\n");
        let ancestry = parse(&text).unwrap();
        let a = ObjectId::from_hex(A.as_bytes()).unwrap();
        let b = ObjectId::from_hex(B.as_bytes()).unwrap();
        let c = ObjectId::from_hex(C.as_bytes()).unwrap();
        assert_eq!(ancestry[&a], vec![b, c]);
        assert_eq!(ancestry[&b], Vec::<ObjectId>::new());
    }

    #[test]
    fn rejects_bad_ids() {
        assert!(parse("not-hex\n").is_err());
    }
}
