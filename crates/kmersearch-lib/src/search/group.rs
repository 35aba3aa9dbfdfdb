//! Grouping of sorted matches into per-target hit lists

use super::seeds::SeedMatch;
use crate::error::Result;
use crate::kmer::SeqType;

/// One candidate query for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Query sequence identifier
    pub query_id: u32,
    /// 1 if query and target matched on opposite strands, else 0.
    /// Self-hits are always 0.
    pub score: u8,
    /// Diagonal of the lowest-diagonal seed
    pub diagonal: i32,
}

/// Destination of grouped hits
pub trait HitSink {
    /// Write all hits of one target. Called at most once per target, in
    /// ascending target order.
    fn write_target(&mut self, target_id: u32, hits: &[Hit]) -> Result<()>;

    /// Finalize the output
    fn finish(&mut self) -> Result<()>;
}

/// Collects hit lists in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    /// Hit lists in write order
    pub targets: Vec<(u32, Vec<Hit>)>,
    /// Set by [`HitSink::finish`]
    pub finished: bool,
}

impl MemorySink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits of one target, if it was written
    pub fn hits_for(&self, target_id: u32) -> Option<&[Hit]> {
        self.targets
            .iter()
            .find(|(t, _)| *t == target_id)
            .map(|(_, hits)| hits.as_slice())
    }
}

impl HitSink for MemorySink {
    fn write_target(&mut self, target_id: u32, hits: &[Hit]) -> Result<()> {
        self.targets.push((target_id, hits.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// Counts reported by [`ResultGrouper::finish`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    /// Targets written
    pub targets: usize,
    /// Hits written
    pub hits: usize,
}

/// Single-pass grouper over matches sorted by (target id, query id,
/// diagonal). Consecutive matches of one query against one target collapse
/// into the first.
pub struct ResultGrouper<'a, K: HitSink + ?Sized> {
    sink: &'a mut K,
    seq_type: SeqType,
    current_target: Option<u32>,
    prev_query: Option<u32>,
    hits: Vec<Hit>,
    stats: GroupStats,
}

impl<'a, K: HitSink + ?Sized> ResultGrouper<'a, K> {
    /// Grouper writing into `sink`
    pub fn new(sink: &'a mut K, seq_type: SeqType) -> Self {
        Self {
            sink,
            seq_type,
            current_target: None,
            prev_query: None,
            hits: Vec::new(),
            stats: GroupStats::default(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(target_id) = self.current_target {
            self.sink.write_target(target_id, &self.hits)?;
            self.stats.targets += 1;
            self.stats.hits += self.hits.len();
            self.hits.clear();
        }
        Ok(())
    }

    /// Feed the next match
    pub fn push(&mut self, m: &SeedMatch) -> Result<()> {
        if self.current_target != Some(m.target_id) {
            self.flush()?;
            self.current_target = Some(m.target_id);
            self.prev_query = None;
        }
        if self.prev_query == Some(m.query_id) {
            return Ok(());
        }
        let score = if m.query_id == m.target_id {
            0
        } else {
            match self.seq_type {
                SeqType::Nucleotide => m.strand().is_reverse() as u8,
                SeqType::AminoAcid => 0,
            }
        };
        self.hits.push(Hit {
            query_id: m.query_id,
            score,
            diagonal: m.diagonal,
        });
        self.prev_query = Some(m.query_id);
        Ok(())
    }

    /// Flush the last target. The sink itself is not finished.
    pub fn finish(mut self) -> Result<GroupStats> {
        self.flush()?;
        Ok(self.stats)
    }
}

/// Group a sorted match stream into `sink`
pub fn group_matches<K, I>(matches: I, sink: &mut K, seq_type: SeqType) -> Result<GroupStats>
where
    K: HitSink + ?Sized,
    I: IntoIterator<Item = SeedMatch>,
{
    let mut grouper = ResultGrouper::new(sink, seq_type);
    for m in matches {
        grouper.push(&m)?;
    }
    grouper.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(target_id: u32, query_id: u32, diagonal: i32, inverted: bool) -> SeedMatch {
        SeedMatch { target_id, inverted, query_id, diagonal }
    }

    #[test]
    fn test_groups_and_collapses() {
        let matches = vec![
            m(1, 2, -3, true),
            m(1, 2, 5, false),
            m(1, 4, 0, false),
            m(3, 2, 1, false),
        ];
        let mut sink = MemorySink::new();
        let stats = group_matches(matches, &mut sink, SeqType::Nucleotide).unwrap();
        assert_eq!(stats, GroupStats { targets: 2, hits: 3 });
        assert_eq!(
            sink.hits_for(1).unwrap(),
            &[
                Hit { query_id: 2, score: 1, diagonal: -3 },
                Hit { query_id: 4, score: 0, diagonal: 0 },
            ]
        );
        // Same query id right after a target change is a new hit
        assert_eq!(sink.hits_for(3).unwrap(), &[Hit { query_id: 2, score: 0, diagonal: 1 }]);
        assert!(!sink.finished);
    }

    #[test]
    fn test_self_hit_score_is_zero() {
        let mut sink = MemorySink::new();
        group_matches(vec![m(7, 7, 0, true)], &mut sink, SeqType::Nucleotide).unwrap();
        assert_eq!(sink.hits_for(7).unwrap()[0].score, 0);
    }

    #[test]
    fn test_amino_acid_score() {
        let mut sink = MemorySink::new();
        group_matches(vec![m(1, 2, 4, false)], &mut sink, SeqType::AminoAcid).unwrap();
        assert_eq!(sink.hits_for(1).unwrap(), &[Hit { query_id: 2, score: 0, diagonal: 4 }]);
    }

    #[test]
    fn test_empty_stream_writes_nothing() {
        let mut sink = MemorySink::new();
        let stats = group_matches(Vec::new(), &mut sink, SeqType::Nucleotide).unwrap();
        assert_eq!(stats, GroupStats::default());
        assert!(sink.targets.is_empty());
    }
}
