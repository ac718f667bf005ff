//! Topic discovery over the embedding cache.
//!
//! Papers are partitioned into topics two ways: a full k-means
//! reclustering that rebuilds every topic from scratch, and an
//! incremental nearest-neighbour pass that places newly encoded papers
//! into the existing topics without disturbing anyone else. Topics are
//! labeled with the predictive keywords of their member titles and
//! persisted as JSON next to the embedding artifacts.

mod keywords;
mod kmeans;

pub use keywords::predictive_keywords;
pub use kmeans::{ClusteringError, KMeansResult, kmeans_clustering};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cache::EmbeddingCache;
use crate::config::Settings;
use crate::corpus::Corpus;
use crate::error::{EngineError, EngineResult};
use crate::similarity::metric_for;
use crate::types::{PaperId, TopicId};

/// File holding the persisted topic partition, in the cache directory.
pub const TOPICS_FILE_NAME: &str = "topics.json";

/// A named cluster of papers with its predictive keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub keywords: Vec<String>,
    pub paper_ids: Vec<PaperId>,
}

impl Topic {
    #[must_use]
    pub fn len(&self) -> usize {
        self.paper_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paper_ids.is_empty()
    }
}

/// Outcome of a full reclustering run.
#[derive(Debug, Clone, Default)]
pub struct ReclusterStats {
    pub topics: usize,
    pub papers: usize,
    pub iterations: usize,
    /// Topics that kept the name of the old topic they overlap most.
    pub carried_names: usize,
}

/// Outcome of an incremental assignment run.
#[derive(Debug, Clone, Default)]
pub struct AssignStats {
    pub assigned: usize,
    /// Papers left without a topic because none of their neighbours had one.
    pub unassigned: usize,
}

/// Maintains the paper-to-topic partition.
pub struct TopicEngine {
    path: PathBuf,
    keyword_count: usize,
    name_keyword_count: usize,
    neighbor_count: usize,
    nb_alpha: f64,
    topics: RwLock<Vec<Topic>>,
}

impl TopicEngine {
    /// Loads the persisted partition, or starts empty when none exists.
    pub fn load(settings: &Settings) -> EngineResult<Self> {
        let path = settings.cache_dir().join(TOPICS_FILE_NAME);
        let topics = load_topics(&path)?;
        if !topics.is_empty() {
            tracing::debug!(topics = topics.len(), path = %path.display(), "loaded topic partition");
        }
        Ok(Self {
            path,
            keyword_count: settings.topics.keyword_count,
            name_keyword_count: settings.topics.name_keyword_count,
            neighbor_count: settings.topics.neighbor_count,
            nb_alpha: settings.topics.nb_alpha,
            topics: RwLock::new(topics),
        })
    }

    /// Snapshot of the current topics.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.read().clone()
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// The topic a paper belongs to, if any.
    #[must_use]
    pub fn topic_of(&self, id: PaperId) -> Option<TopicId> {
        self.topics
            .read()
            .iter()
            .find(|topic| topic.paper_ids.contains(&id))
            .map(|topic| topic.id)
    }

    /// Current paper-to-topic map.
    #[must_use]
    pub fn assignments(&self) -> HashMap<PaperId, TopicId> {
        let mut map = HashMap::new();
        for topic in self.topics.read().iter() {
            for &paper in &topic.paper_ids {
                map.insert(paper, topic.id);
            }
        }
        map
    }

    /// Rebuilds the whole partition: k-means over the blended vectors of
    /// every cached paper, keyword extraction per cluster, and naming.
    ///
    /// A new topic takes the name of the old topic it shares the most
    /// papers with; topics without such an overlap are named by their
    /// leading keywords. `k` is capped at the paper count. An empty cache
    /// clusters to zero topics.
    pub fn recluster(
        &self,
        corpus: &dyn Corpus,
        cache: &EmbeddingCache,
        k: usize,
    ) -> EngineResult<ReclusterStats> {
        let (ids, blended) = {
            let matrix = cache.matrix();
            (matrix.ids().to_vec(), matrix.blended(cache.title_importance()))
        };

        if ids.is_empty() {
            tracing::info!("no encoded papers, clearing topic partition");
            let mut topics = self.topics.write();
            topics.clear();
            save_topics(&self.path, &topics)?;
            return Ok(ReclusterStats::default());
        }

        let k = k.clamp(1, ids.len());
        let result = kmeans_clustering(&blended, k)?;
        tracing::info!(
            papers = ids.len(),
            clusters = k,
            iterations = result.iterations,
            "k-means finished"
        );

        let old_names: HashMap<PaperId, String> = {
            let topics = self.topics.read();
            topics
                .iter()
                .flat_map(|topic| {
                    topic
                        .paper_ids
                        .iter()
                        .map(|&paper| (paper, topic.name.clone()))
                })
                .collect()
        };

        let mut members: Vec<Vec<PaperId>> = vec![Vec::new(); k];
        for (row, &label) in result.assignments.iter().enumerate() {
            members[label].push(ids[row]);
        }

        let titles_by_id: HashMap<PaperId, String> = corpus
            .papers_by_ids(&ids)
            .into_iter()
            .map(|paper| (paper.id, paper.title))
            .collect();
        let class_titles: Vec<Vec<String>> = members
            .iter()
            .map(|cluster| {
                cluster
                    .iter()
                    .filter_map(|id| titles_by_id.get(id).cloned())
                    .collect()
            })
            .collect();
        let keywords = predictive_keywords(&class_titles, self.keyword_count, self.nb_alpha);

        let mut carried_names = 0;
        let new_topics: Vec<Topic> = members
            .into_iter()
            .zip(keywords)
            .enumerate()
            .map(|(label, (mut paper_ids, keywords))| {
                paper_ids.sort_unstable();
                let carried = best_overlapping_name(&paper_ids, &old_names);
                if carried.is_some() {
                    carried_names += 1;
                }
                let name = carried.unwrap_or_else(|| {
                    keywords
                        .iter()
                        .take(self.name_keyword_count)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                });
                Topic {
                    id: TopicId::new_unchecked(label as u32 + 1),
                    name,
                    keywords,
                    paper_ids,
                }
            })
            .collect();

        let stats = ReclusterStats {
            topics: new_topics.len(),
            papers: ids.len(),
            iterations: result.iterations,
            carried_names,
        };

        let mut topics = self.topics.write();
        *topics = new_topics;
        save_topics(&self.path, &topics)?;
        tracing::info!(
            topics = stats.topics,
            carried_names = stats.carried_names,
            "topic partition rebuilt"
        );
        Ok(stats)
    }

    /// Places unassigned cached papers into existing topics by a
    /// similarity-weighted vote of their nearest embedded neighbours.
    ///
    /// Only papers that had a topic when the run started may vote, so a
    /// paper assigned during the run never drags its own neighbours
    /// along. Papers whose neighbours are all unassigned stay that way.
    /// Already-assigned papers are never moved.
    pub fn assign_new(&self, cache: &EmbeddingCache) -> EngineResult<AssignStats> {
        let (ids, blended) = {
            let matrix = cache.matrix();
            (matrix.ids().to_vec(), matrix.blended(cache.title_importance()))
        };
        let assigned = self.assignments();
        let metric = metric_for(cache.kind());

        let mut stats = AssignStats::default();
        let mut placements: Vec<(PaperId, TopicId)> = Vec::new();

        for (row, &paper) in ids.iter().enumerate() {
            if assigned.contains_key(&paper) {
                continue;
            }

            let scores = metric.scores(blended.row(row), &blended);
            let mut neighbors: Vec<(usize, f32)> = scores
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != row)
                .map(|(other, score)| (other, score.get()))
                .collect();
            neighbors.sort_by(|a, b| {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            });
            neighbors.truncate(self.neighbor_count);

            let mut votes: BTreeMap<TopicId, f32> = BTreeMap::new();
            for (other, score) in neighbors {
                if let Some(&topic) = assigned.get(&ids[other]) {
                    *votes.entry(topic).or_insert(0.0) += score;
                }
            }

            // Ties go to the smallest topic id.
            let mut winner: Option<(TopicId, f32)> = None;
            for (topic, total) in votes {
                match winner {
                    Some((_, best)) if total <= best => {}
                    _ => winner = Some((topic, total)),
                }
            }

            match winner {
                Some((topic, total)) => {
                    tracing::debug!(paper = %paper, topic = %topic, total, "assigned by neighbour vote");
                    placements.push((paper, topic));
                    stats.assigned += 1;
                }
                None => {
                    tracing::debug!(paper = %paper, "no assigned neighbours, leaving unassigned");
                    stats.unassigned += 1;
                }
            }
        }

        if !placements.is_empty() {
            let mut topics = self.topics.write();
            for (paper, topic_id) in placements {
                if let Some(topic) = topics.iter_mut().find(|topic| topic.id == topic_id) {
                    topic.paper_ids.push(paper);
                }
            }
            for topic in topics.iter_mut() {
                topic.paper_ids.sort_unstable();
            }
            save_topics(&self.path, &topics)?;
        }

        tracing::info!(
            assigned = stats.assigned,
            unassigned = stats.unassigned,
            "incremental topic assignment finished"
        );
        Ok(stats)
    }
}

/// Name of the old topic sharing the most papers with `paper_ids`.
fn best_overlapping_name(
    paper_ids: &[PaperId],
    old_names: &HashMap<PaperId, String>,
) -> Option<String> {
    let mut overlap: BTreeMap<&str, usize> = BTreeMap::new();
    for id in paper_ids {
        if let Some(name) = old_names.get(id) {
            *overlap.entry(name.as_str()).or_insert(0) += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (name, count) in overlap {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((name, count)),
        }
    }
    best.map(|(name, _)| name.to_string())
}

fn load_topics(path: &Path) -> EngineResult<Vec<Topic>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(EngineError::FileRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    serde_json::from_str(&raw).map_err(|e| {
        EngineError::General(format!(
            "Topic file '{}' is not valid JSON: {e}\nSuggestion: Delete the file and run a fresh reclustering",
            path.display()
        ))
    })
}

fn save_topics(path: &Path, topics: &[Topic]) -> EngineResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| EngineError::FileWrite {
        path: parent.to_path_buf(),
        source: e,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| EngineError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    let payload = serde_json::to_vec_pretty(topics)
        .map_err(|e| EngineError::General(format!("Failed to serialize topics: {e}")))?;
    tmp.write_all(&payload).map_err(|e| EngineError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| EngineError::FileWrite {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
