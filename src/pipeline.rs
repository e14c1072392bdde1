//! The mention pipeline.
//!
//! ```text
//! COLLECT ──▶ EXTRACT_AND_GROUP ──▶ FINALIZE ──▶ REPORT
//! sources      extractor             score
//!              resolver              build
//!              MentionQueue          embed
//!                                    persist
//! ```
//!
//! COLLECT and EXTRACT_AND_GROUP are strictly sequential: group identity
//! depends on arrival order. FINALIZE processes groups through an ordered
//! buffered stream (`pipeline.finalize_concurrency`, default 1). Each group
//! still runs score, build, embed and persist in order, and results are
//! folded into the [`RunReport`] after the stream completes.
//!
//! No single failure aborts the batch. Source, extraction, embedding and
//! store failures are recorded in [`RunReport::errors`] and the run moves on.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use belly_buzz_core::builder;
use belly_buzz_core::metrics;
use belly_buzz_core::models::{ContentItem, GroupedMention, MentionGroup, MentionOrigin};
use belly_buzz_core::persist::persist_group;
use belly_buzz_core::resolve::{Admission, IdentityResolver, MentionQueue};
use belly_buzz_core::store::memory::InMemoryStore;
use belly_buzz_core::store::Store;
use belly_buzz_core::traits::{ContentSource, Embedder, Extractor, PlaceLookup};

use crate::config::{Config, PipelineConfig};
use crate::db;
use crate::embedding::create_embedder;
use crate::export::{unique_ids, write_export, RankedRestaurant};
use crate::extract::create_extractor;
use crate::migrate;
use crate::place_cache::CachedPlaces;
use crate::places::create_place_lookup;
use crate::sources::{create_sources, sample_posts, SampleSource};
use crate::sqlite_store::SqliteStore;
use crate::timeout::Timed;

/// Per-invocation options, usually from the `buzz run` flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limit: usize,
    pub days_back: u32,
    /// Read the bundled sample posts instead of the configured sources.
    pub mock_data: bool,
    /// Persist into an in-memory store; nothing touches the database.
    pub dry_run: bool,
    /// Export path override.
    pub output: Option<PathBuf>,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: config.pipeline.limit,
            days_back: config.pipeline.days_back,
            mock_data: false,
            dry_run: false,
            output: None,
        }
    }
}

/// Collaborators for one run.
///
/// Built once by [`Services::connect`] and released by [`Services::close`].
pub struct Services {
    pub sources: Vec<Box<dyn ContentSource>>,
    pub extractor: Box<dyn Extractor>,
    pub places: Box<dyn PlaceLookup>,
    pub embedder: Box<dyn Embedder>,
    pub store: Arc<dyn Store>,
    pool: Option<SqlitePool>,
}

impl Services {
    /// Assemble services from ready-made collaborators. No pool is owned.
    pub fn new(
        sources: Vec<Box<dyn ContentSource>>,
        extractor: Box<dyn Extractor>,
        places: Box<dyn PlaceLookup>,
        embedder: Box<dyn Embedder>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            sources,
            extractor,
            places,
            embedder,
            store,
            pool: None,
        }
    }

    /// Build every collaborator from config and open the database.
    ///
    /// Each collaborator call is bounded by `pipeline.call_timeout_secs`.
    /// With `dry_run` the store is an [`InMemoryStore`] and no pool is opened.
    pub async fn connect(config: &Config, opts: &RunOptions) -> Result<Self> {
        let secs = config.pipeline.call_timeout_secs;

        let sources: Vec<Box<dyn ContentSource>> = if opts.mock_data {
            vec![Box::new(SampleSource)]
        } else {
            create_sources(&config.sources)?
        };
        let sources = sources
            .into_iter()
            .map(|s| Box::new(Timed::new(secs, s)) as Box<dyn ContentSource>)
            .collect();

        let extractor = Box::new(Timed::new(
            secs,
            create_extractor(&config.extraction, &config.pipeline.city)?,
        ));
        let places: Box<dyn PlaceLookup> =
            Box::new(Timed::new(secs, create_place_lookup(&config.enrichment)?));
        let embedder = Box::new(Timed::new(secs, create_embedder(&config.embedding)?));

        let (store, pool): (Arc<dyn Store>, Option<SqlitePool>) = if opts.dry_run {
            info!("dry run: writing to an in-memory store");
            (Arc::new(InMemoryStore::new()), None)
        } else {
            let pool = db::connect(config).await?;
            if let Err(e) = migrate::apply(&pool).await {
                pool.close().await;
                return Err(e);
            }
            (Arc::new(SqliteStore::new(pool.clone())), Some(pool))
        };

        let places = match &pool {
            Some(pool) if config.enrichment.cache => {
                Box::new(CachedPlaces::new(pool.clone(), places)) as Box<dyn PlaceLookup>
            }
            _ => places,
        };

        Ok(Self {
            sources,
            extractor,
            places,
            embedder,
            store,
            pool,
        })
    }

    /// Release the database pool, if one was opened.
    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
            debug!("database pool closed");
        }
    }
}

/// Run-level knobs taken from `[pipeline]`.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub city: String,
    pub max_groups: usize,
    pub raw_text_max_chars: usize,
    pub finalize_concurrency: usize,
    pub sample_fallback: bool,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            city: config.city.clone(),
            max_groups: config.max_groups,
            raw_text_max_chars: config.raw_text_max_chars,
            finalize_concurrency: config.finalize_concurrency.max(1),
            sample_fallback: config.sample_fallback,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub scraped: usize,
    pub groups_resolved: usize,
    /// Groups that had a place match.
    pub enriched: usize,
    /// Groups whose restaurant row was written.
    pub stored: usize,
    pub errors: Vec<String>,
    pub elapsed: Duration,
    /// One entry per stored group, in processing order.
    pub ranked: Vec<RankedRestaurant>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Belly Buzz run complete")?;
        writeln!(f, "  scraped:         {}", self.scraped)?;
        writeln!(f, "  groups resolved: {}", self.groups_resolved)?;
        writeln!(f, "  enriched:        {}", self.enriched)?;
        writeln!(f, "  stored:          {}", self.stored)?;
        writeln!(f, "  elapsed:         {:.2}s", self.elapsed.as_secs_f64())?;
        write!(f, "  errors:          {}", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n    - {}", err)?;
        }
        Ok(())
    }
}

/// Result of finalizing one group, folded into the report afterwards.
struct Finalized {
    enriched: bool,
    ranked: Option<RankedRestaurant>,
    errors: Vec<String>,
}

pub struct Pipeline<'a> {
    services: &'a Services,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(services: &'a Services, settings: PipelineSettings) -> Self {
        Self { services, settings }
    }

    pub async fn run(&self, opts: &RunOptions) -> RunReport {
        let started = Instant::now();
        let now = Utc::now();
        let mut report = RunReport::default();

        let items = self.collect(opts, &mut report.errors).await;
        report.scraped = items.len();
        if items.is_empty() {
            warn!("no content collected; nothing to do");
            report.elapsed = started.elapsed();
            return report;
        }

        let groups = self.extract_and_group(&items, &mut report.errors).await;
        report.groups_resolved = groups.len();

        let finalized: Vec<Finalized> = stream::iter(groups.iter().map(|g| self.finalize(g, now)))
            .buffered(self.settings.finalize_concurrency)
            .collect()
            .await;

        for f in finalized {
            if f.enriched {
                report.enriched += 1;
            }
            if let Some(ranked) = f.ranked {
                report.stored += 1;
                report.ranked.push(ranked);
            }
            report.errors.extend(f.errors);
        }
        unique_ids(&mut report.ranked);

        report.elapsed = started.elapsed();
        info!(
            scraped = report.scraped,
            groups = report.groups_resolved,
            enriched = report.enriched,
            stored = report.stored,
            errors = report.errors.len(),
            "run finished"
        );
        report
    }

    async fn collect(&self, opts: &RunOptions, errors: &mut Vec<String>) -> Vec<ContentItem> {
        let mut items = Vec::new();
        for source in &self.services.sources {
            match source.collect(opts.limit, opts.days_back).await {
                Ok(batch) => {
                    info!(source = source.name(), items = batch.len(), "collected");
                    items.extend(batch);
                }
                Err(e) => {
                    warn!(source = source.name(), "collection failed: {}", e);
                    errors.push(format!("Source error for {}: {}", source.name(), e));
                }
            }
        }

        if items.is_empty() && self.settings.sample_fallback {
            warn!("sources returned nothing; falling back to bundled samples");
            items = sample_posts();
        }
        items
    }

    async fn extract_and_group(
        &self,
        items: &[ContentItem],
        errors: &mut Vec<String>,
    ) -> Vec<MentionGroup> {
        let mut resolver = IdentityResolver::new(self.services.places.as_ref(), &self.settings.city);
        let mut queue = MentionQueue::with_capacity(self.settings.max_groups);
        let mut dropped = 0usize;

        for item in items {
            let mentions = match self.services.extractor.extract(&item.content).await {
                Ok(mentions) => mentions,
                Err(e) => {
                    warn!(url = %item.source_url(), "extraction failed: {}", e);
                    errors.push(format!("Extraction error: {}", e));
                    continue;
                }
            };

            let origin = MentionOrigin::from_item(item, self.settings.raw_text_max_chars);
            for mention in mentions {
                if mention.name.trim().is_empty() {
                    continue;
                }
                let resolution = resolver.resolve(&mention).await;
                let grouped = GroupedMention {
                    mention,
                    origin: origin.clone(),
                };
                if queue.push(resolution, grouped) == Admission::Rejected {
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            warn!(dropped, max_groups = self.settings.max_groups, "group limit reached");
            errors.push(format!(
                "Group limit of {} reached; {} mentions dropped",
                self.settings.max_groups, dropped
            ));
        }
        debug!(
            lookups = resolver.lookups(),
            lookup_failures = resolver.failures(),
            groups = queue.len(),
            "grouping done"
        );
        queue.into_groups()
    }

    async fn finalize(&self, group: &MentionGroup, now: DateTime<Utc>) -> Finalized {
        let scores = metrics::score(group);
        let mut restaurant = builder::build(group, &self.settings.city);
        let mut errors = Vec::new();

        match self
            .services
            .embedder
            .embed(&builder::embedding_text(&restaurant))
            .await
        {
            Ok(vector) if !vector.is_empty() => restaurant.embedding = Some(vector),
            Ok(_) => {}
            Err(e) if e.is_unavailable() => {
                debug!(restaurant = %restaurant.name, "embedding skipped: {}", e)
            }
            Err(e) => {
                warn!(restaurant = %restaurant.name, "embedding failed: {}", e);
                errors.push(format!("Embedding error for {}: {}", restaurant.name, e));
            }
        }

        let outcome = persist_group(
            self.services.store.as_ref(),
            &restaurant,
            scores,
            &group.mentions,
            now,
        )
        .await;
        errors.extend(outcome.errors.iter().cloned());

        let ranked = outcome.restaurant_id.map(|id| {
            restaurant.id = Some(id);
            RankedRestaurant::new(&restaurant, &scores, group)
        });

        Finalized {
            enriched: group.place.is_some(),
            ranked,
            errors,
        }
    }
}

/// Run the whole job: connect, run, close, export.
///
/// Services are closed before the export is written, whatever the run
/// produced. A dry run only exports when `--output` was given.
pub async fn run_pipeline(config: &Config, opts: &RunOptions) -> Result<RunReport> {
    let services = Services::connect(config, opts).await?;
    let report = Pipeline::new(&services, PipelineSettings::from(&config.pipeline))
        .run(opts)
        .await;
    services.close().await;

    let output = match (&opts.output, opts.dry_run) {
        (Some(path), _) => Some(path.clone()),
        (None, false) => Some(config.export.output.clone()),
        (None, true) => None,
    };
    if let Some(path) = output {
        write_export(&path, &report.ranked, Utc::now())?;
    }
    Ok(report)
}
