//! Commits cached links to the on-chain config in fixed-size batches.
//!
//! Items are split into slices of [`SLICE_SIZE`] that are written
//! concurrently, and each slice is written sequentially in groups of
//! [`GROUP_SIZE`] lines, one transaction per group. A group whose items are
//! all on chain already is skipped, otherwise the whole group is resent. A
//! failed group is logged and left pending for the next run.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;

use crate::{cache::Item, program::ConfigLine};

/// Items handled by one concurrent writer
pub const SLICE_SIZE: usize = 1000;
/// Config lines sent per transaction
pub const GROUP_SIZE: usize = 10;

/// Destination for config lines, usually the candy machine program
#[async_trait]
pub trait ConfigLineWriter: Sync {
    /// Store `lines` at consecutive positions starting at `start_index`
    async fn add_config_lines(&self, start_index: u32, lines: Vec<ConfigLine>)
        -> anyhow::Result<()>;
}

/// Outcome of one pass, counted in groups
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    fn merge(self, other: Self) -> Self {
        Self {
            written: self.written + other.written,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
        }
    }
}

/// Write every item that is not yet on chain, marking the ones that succeed.
///
/// The caller owns persisting `items` afterwards.
pub async fn add_links_to_collection<W: ConfigLineWriter + ?Sized>(
    writer: &W,
    items: &mut BTreeMap<u32, Item>,
) -> BatchReport {
    tracing::info!(items = items.len(), "adding links to collection");

    let mut entries: Vec<(u32, &mut Item)> = items.iter_mut().map(|(k, v)| (*k, v)).collect();

    let report = join_all(
        entries
            .chunks_mut(SLICE_SIZE)
            .map(|slice| write_slice(writer, slice)),
    )
    .await
    .into_iter()
    .fold(BatchReport::default(), BatchReport::merge);

    tracing::info!(
        written = report.written,
        skipped = report.skipped,
        failed = report.failed,
        "finished adding links"
    );
    report
}

async fn write_slice<W: ConfigLineWriter + ?Sized>(
    writer: &W,
    slice: &mut [(u32, &mut Item)],
) -> BatchReport {
    let mut report = BatchReport::default();

    for group in slice.chunks_mut(GROUP_SIZE) {
        if group.iter().all(|(_, item)| item.on_chain) {
            report.skipped += 1;
            continue;
        }

        let start = group[0].0;
        let end = group[group.len() - 1].0;

        if !is_contiguous(group) {
            tracing::warn!(start, end, "config line indices are not contiguous");
        }

        tracing::info!(start, end, "writing config lines");

        let lines = group
            .iter()
            .map(|(_, item)| ConfigLine {
                name: item.name.clone(),
                uri: item.link.clone(),
            })
            .collect();

        match writer.add_config_lines(start, lines).await {
            Ok(()) => {
                for (_, item) in group.iter_mut() {
                    item.on_chain = true;
                }
                report.written += 1;
            },
            Err(e) => {
                tracing::error!(start, end, "saving config lines failed: {e:#}");
                report.failed += 1;
            },
        }
    }

    report
}

fn is_contiguous(group: &[(u32, &mut Item)]) -> bool {
    group
        .windows(2)
        .all(|w| w[0].0.checked_add(1) == Some(w[1].0))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex};

    use super::*;

    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(u32, Vec<ConfigLine>)>>,
        fail_at: HashSet<u32>,
    }

    impl RecordingWriter {
        fn failing_at(starts: impl IntoIterator<Item = u32>) -> Self {
            Self {
                fail_at: starts.into_iter().collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(u32, Vec<ConfigLine>)> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort_by_key(|(start, _)| *start);
            calls
        }
    }

    #[async_trait]
    impl ConfigLineWriter for RecordingWriter {
        async fn add_config_lines(
            &self,
            start_index: u32,
            lines: Vec<ConfigLine>,
        ) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((start_index, lines));
            anyhow::ensure!(
                !self.fail_at.contains(&start_index),
                "simulated failure at {start_index}"
            );
            Ok(())
        }
    }

    fn item(i: u32, on_chain: bool) -> Item {
        Item {
            link: format!("https://arweave.net/{i}"),
            name: format!("Item {i}"),
            on_chain,
        }
    }

    fn pending(keys: impl IntoIterator<Item = u32>) -> BTreeMap<u32, Item> {
        keys.into_iter().map(|i| (i, item(i, false))).collect()
    }

    #[tokio::test]
    async fn fifteen_items_take_two_calls() {
        let writer = RecordingWriter::default();
        let mut items = pending(0..15);

        let report = add_links_to_collection(&writer, &mut items).await;

        let calls = writer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, 0);
        assert_eq!(calls[0].1.len(), 10);
        assert_eq!(calls[1].0, 10);
        assert_eq!(calls[1].1.len(), 5);
        assert_eq!(calls[1].1[0], ConfigLine {
            name: "Item 10".into(),
            uri: "https://arweave.net/10".into(),
        });
        assert!(items.values().all(|i| i.on_chain));
        assert_eq!(report, BatchReport {
            written: 2,
            skipped: 0,
            failed: 0,
        });
    }

    #[tokio::test]
    async fn committed_groups_are_never_resent() {
        let writer = RecordingWriter::default();
        let mut items: BTreeMap<_, _> = (0..25).map(|i| (i, item(i, i < 10))).collect();

        let report = add_links_to_collection(&writer, &mut items).await;

        let starts: Vec<_> = writer.calls().into_iter().map(|(s, _)| s).collect();
        assert_eq!(starts, [10, 20]);
        assert_eq!(report.skipped, 1);

        // a second pass has nothing left to do
        let again = RecordingWriter::default();
        let report = add_links_to_collection(&again, &mut items).await;
        assert!(again.calls().is_empty());
        assert_eq!(report.skipped, 3);
    }

    #[tokio::test]
    async fn partially_committed_group_is_resent_whole() {
        let writer = RecordingWriter::default();
        let mut items: BTreeMap<_, _> = (0..10).map(|i| (i, item(i, i != 4))).collect();

        add_links_to_collection(&writer, &mut items).await;

        let calls = writer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.len(), 10);
        assert!(items.values().all(|i| i.on_chain));
    }

    #[tokio::test]
    async fn success_only_touches_its_own_group() {
        let writer = RecordingWriter::failing_at([10]);
        let mut items = pending(0..20);

        let report = add_links_to_collection(&writer, &mut items).await;

        assert!((0..10u32).all(|i| items[&i].on_chain));
        assert!((10..20u32).all(|i| !items[&i].on_chain));
        assert_eq!(report.written, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn failure_leaves_items_untouched() {
        let writer = RecordingWriter::failing_at([0]);
        let mut items: BTreeMap<_, _> = (0..10).map(|i| (i, item(i, i % 3 == 0))).collect();
        let before = items.clone();

        let report = add_links_to_collection(&writer, &mut items).await;

        assert_eq!(items, before);
        assert_eq!(
            serde_json::to_vec(&items).unwrap(),
            serde_json::to_vec(&before).unwrap()
        );
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn partition_is_exhaustive_and_disjoint() {
        let writer = RecordingWriter::default();
        let mut items = pending(0..2345);

        add_links_to_collection(&writer, &mut items).await;

        let calls = writer.calls();
        // 100 + 100 + 35 groups
        assert_eq!(calls.len(), 235);

        let mut sent = Vec::new();
        for (start, lines) in &calls {
            assert!(lines.len() <= GROUP_SIZE);
            // groups never straddle a slice boundary
            let first = *start as usize;
            let last = first + lines.len() - 1;
            assert_eq!(first / SLICE_SIZE, last / SLICE_SIZE);

            for (offset, line) in lines.iter().enumerate() {
                sent.push(first + offset);
                assert_eq!(line.name, format!("Item {}", first + offset));
            }
        }
        assert_eq!(sent, (0..2345).collect::<Vec<_>>());
        assert!(items.values().all(|i| i.on_chain));
    }

    #[tokio::test]
    async fn sparse_indices_use_first_key_as_start() {
        let writer = RecordingWriter::default();
        let mut items = pending((0..12).map(|i| i * 2));

        add_links_to_collection(&writer, &mut items).await;

        let calls = writer.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, 0);
        assert_eq!(calls[1].0, 20);
        assert_eq!(calls[1].1[0].name, "Item 20");
    }

    #[tokio::test]
    async fn empty_map_makes_no_calls() {
        let writer = RecordingWriter::default();
        let mut items = BTreeMap::new();

        let report = add_links_to_collection(&writer, &mut items).await;

        assert!(writer.calls().is_empty());
        assert_eq!(report, BatchReport::default());
    }
}
