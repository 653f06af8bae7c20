//! Model-based property test: random op sequences over a handful of paths
//! against an in-memory shadow of every file, under a random descriptor
//! budget.
//!
//! Ops are serialized (each ticket is waited before the next submit) so the
//! shadow stays a valid oracle; eviction churn across paths is still fully
//! exercised because the budget is smaller than the path set.

use std::collections::HashMap;

use proptest::prelude::*;

use fdspool::{OpError, Spool, SpoolConfig};

const PATHS: &[&str] = &["a", "b", "sub/c", "sub/deep/d"];
const PROPTEST_CASES: u32 = 16;

#[derive(Clone, Debug)]
enum ModelOp {
    Write { path: usize, offset: u64, data: Vec<u8> },
    Read { path: usize, offset: u64, len: usize },
}

fn model_op() -> impl Strategy<Value = ModelOp> {
    prop_oneof![
        (
            0..PATHS.len(),
            0..512u64,
            prop::collection::vec(any::<u8>(), 1..96)
        )
            .prop_map(|(path, offset, data)| ModelOp::Write { path, offset, data }),
        (0..PATHS.len(), 0..600u64, 1..96usize)
            .prop_map(|(path, offset, len)| ModelOp::Read { path, offset, len }),
    ]
}

/// Applies a write to the shadow file, zero-filling any hole before it.
fn shadow_write(shadow: &mut Vec<u8>, offset: u64, data: &[u8]) {
    let offset = offset as usize;
    let end = offset + data.len();
    if shadow.len() < end {
        shadow.resize(end, 0);
    }
    shadow[offset..end].copy_from_slice(data);
}

/// What a read of `len` at `offset` must return given the shadow contents.
fn shadow_read(shadow: &[u8], offset: u64, len: usize) -> Result<Vec<u8>, usize> {
    let offset = offset as usize;
    let available = shadow.len().saturating_sub(offset);
    if available < len {
        Err(available.min(len))
    } else {
        Ok(shadow[offset..offset + len].to_vec())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn random_ops_match_the_shadow_model(
        budget in 1..4usize,
        ops in prop::collection::vec(model_op(), 1..120),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(SpoolConfig::new(dir.path(), budget)).unwrap();
        let handles: Vec<_> = PATHS
            .iter()
            .map(|p| spool.storage_for(p).unwrap())
            .collect();
        let mut shadows: HashMap<usize, Vec<u8>> =
            (0..PATHS.len()).map(|i| (i, Vec::new())).collect();

        for op in &ops {
            match op {
                ModelOp::Write { path, offset, data } => {
                    handles[*path]
                        .write(*offset, data.clone())
                        .unwrap()
                        .wait()
                        .unwrap();
                    shadow_write(shadows.get_mut(path).unwrap(), *offset, data);
                }
                ModelOp::Read { path, offset, len } => {
                    let result = handles[*path].read(*offset, *len).unwrap().wait();
                    match shadow_read(&shadows[path], *offset, *len) {
                        Ok(expected) => {
                            prop_assert_eq!(result.unwrap(), expected);
                        }
                        Err(expected_got) => match result {
                            Err(OpError::ShortRead { requested, got }) => {
                                prop_assert_eq!(requested, *len);
                                prop_assert_eq!(got, expected_got);
                            }
                            other => prop_assert!(
                                false,
                                "expected short read of {} bytes, got {:?}",
                                expected_got,
                                other
                            ),
                        },
                    }
                }
            }
            // The budget invariant holds at every step.
            prop_assert!(spool.stats().peak_open_fds <= budget as u64);
        }

        // Full read-back of every non-empty file matches the shadow.
        for (idx, shadow) in &shadows {
            if shadow.is_empty() {
                continue;
            }
            let bytes = handles[*idx].read(0, shadow.len()).unwrap().wait().unwrap();
            prop_assert_eq!(&bytes, shadow);
        }

        // Everything submitted was answered.
        let snap = spool.stats();
        prop_assert_eq!(
            snap.reads_completed + snap.short_reads + snap.writes_completed,
            snap.ops_submitted
        );
    }
}
