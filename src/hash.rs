//! A single hash of an edge's expanded recipe is recorded in the build log
//! and compared across runs to decide whether the recipe changed.

use crate::graph::{Edge, EdgeFlags};
use anyhow::bail;

/// The hash of the command (and response file content, if any) that produces
/// an output.  Persisted in the build log, so its value is part of the log
/// format.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Hash(pub u64);

/// Separates the command from the response file content in the hashed bytes.
/// Fixed by the log format.
const RSPFILE_SEP: &[u8] = b";rspfile=";

/// MurmurHash64A with seed 0.  Lanes are read little-endian so the result is
/// identical on every platform; logs written on one machine stay valid on
/// another.
pub fn murmur64(data: &[u8]) -> Hash {
    const SEED: u64 = 0;
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut h = SEED ^ (data.len() as u64).wrapping_mul(M);

    let mut lanes = data.chunks_exact(8);
    for lane in &mut lanes {
        let mut k = u64::from_le_bytes(lane.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = lanes.remainder();
    if !tail.is_empty() {
        let mut k: u64 = 0;
        for (i, &b) in tail.iter().enumerate() {
            k |= (b as u64) << (8 * i);
        }
        h ^= k;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    Hash(h)
}

/// Compute and memoize the recipe hash of an edge: the hash of its expanded
/// `command`, with `rspfile_content` appended after a separator when the edge
/// writes a response file.  Once computed, the stored value is returned
/// without consulting the edge's variables again.
pub fn hash_edge(edge: &mut Edge) -> anyhow::Result<Hash> {
    if edge.flags.contains(EdgeFlags::HASH) {
        return Ok(edge.hash);
    }
    let hash = {
        let command = match edge.var("command") {
            Some(command) => command,
            None => bail!("rule has no command: {}", edge.rule.name),
        };
        match edge.var("rspfile_content") {
            Some(rsp) if !rsp.is_empty() => {
                let mut buf =
                    Vec::with_capacity(command.len() + RSPFILE_SEP.len() + rsp.len());
                buf.extend_from_slice(command.as_bytes());
                buf.extend_from_slice(RSPFILE_SEP);
                buf.extend_from_slice(rsp.as_bytes());
                murmur64(&buf)
            }
            _ => murmur64(command.as_bytes()),
        }
    };
    edge.hash = hash;
    edge.flags.insert(EdgeFlags::HASH);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Rule, Scope};
    use crate::graph::{Edge, EdgeIns, EdgeOuts};
    use std::rc::Rc;

    fn edge_with(command: Option<&str>, rule_name: &str) -> Edge {
        let mut rule = Rule::new(rule_name);
        if let Some(command) = command {
            rule.vars.insert("command".to_owned(), command.to_owned());
        }
        Edge::new(
            Rc::new(rule),
            Scope::root(),
            EdgeIns::default(),
            EdgeOuts::default(),
        )
    }

    #[test]
    fn empty_input_hashes_to_zero() {
        // With seed 0 the hash of no bytes is 0, which node defaults rely on.
        assert_eq!(murmur64(b""), Hash(0));
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            murmur64(b"cc -c foo.c -o foo.o"),
            murmur64(b"cc -c foo.c -o foo.o")
        );
        assert_ne!(
            murmur64(b"cc -c foo.c -o foo.o"),
            murmur64(b"cc -c foo.c -o bar.o")
        );
    }

    #[test]
    fn every_tail_length_distinct() {
        // Cover the lane loop plus all seven tail lengths.
        let data = b"abcdefghijklmnop";
        let mut seen = std::collections::HashSet::new();
        for len in 0..=data.len() {
            assert!(seen.insert(murmur64(&data[..len]).0));
        }
    }

    #[test]
    fn hashes_expanded_command() {
        let mut edge = edge_with(Some("cc -c main.c -o out.o"), "cc");
        assert_eq!(
            hash_edge(&mut edge).unwrap(),
            murmur64(b"cc -c main.c -o out.o")
        );
    }

    #[test]
    fn rspfile_content_changes_hash() {
        let plain = hash_edge(&mut edge_with(Some("link"), "ld")).unwrap();

        let mut edge = edge_with(Some("link"), "ld");
        edge.env.set("rspfile_content", "obj1 obj2");
        let with_rsp = hash_edge(&mut edge).unwrap();
        assert_ne!(with_rsp, plain);
        assert_eq!(with_rsp, murmur64(b"link;rspfile=obj1 obj2"));
    }

    #[test]
    fn empty_rspfile_content_hashes_like_none() {
        let plain = hash_edge(&mut edge_with(Some("link"), "ld")).unwrap();

        let mut edge = edge_with(Some("link"), "ld");
        edge.env.set("rspfile_content", "");
        assert_eq!(hash_edge(&mut edge).unwrap(), plain);
    }

    #[test]
    fn memoizes_first_result() {
        let mut edge = edge_with(Some("cc one"), "cc");
        let first = hash_edge(&mut edge).unwrap();

        // A binding change after the first hash must not show up.
        edge.env.set("command", "cc two");
        assert_eq!(hash_edge(&mut edge).unwrap(), first);
    }

    #[test]
    fn missing_command_names_the_rule() {
        for name in ["cc", "some_rule"] {
            let mut edge = edge_with(None, name);
            let err = hash_edge(&mut edge).unwrap_err();
            assert_eq!(err.to_string(), format!("rule has no command: {}", name));
        }
    }
}
