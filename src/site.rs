use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::aux_data::AuxStore;
use crate::config::BuildConfig;
use crate::index::{IndexOptions, PagePath, SiteIndex, build_index};
use crate::merge::{apply_window, merge};
use crate::output::{clean_generated, materialized_urls, prune_stale_pages, write_atomic};
use crate::pages::{PageContext, channel_bindings, detail_bindings, listing_bindings};
use crate::shard::load_shard_dir;
use crate::sitemap::render_sitemap;
use crate::template::Template;

pub const HOME_TEMPLATE: &str = "home_template.html";
pub const MATCH_TEMPLATE: &str = "match_template.html";
pub const CHANNEL_TEMPLATE: &str = "channel_template.html";
pub const SITEMAP_FILE: &str = "sitemap.xml";

/// The three page templates. All must load before anything is written.
#[derive(Debug, Clone)]
pub struct Templates {
    pub home: Template,
    pub detail: Template,
    pub channel: Template,
}

impl Templates {
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            home: Template::load(&dir.join(HOME_TEMPLATE))?,
            detail: Template::load(&dir.join(MATCH_TEMPLATE))?,
            channel: Template::load(&dir.join(CHANNEL_TEMPLATE))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: PagePath,
    pub body: String,
}

/// Counters for one build. Everything here was recovered from locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub shards_read: usize,
    pub shards_skipped: usize,
    pub records_rejected: usize,
    pub duplicates_dropped: usize,
    pub outside_window: usize,
    pub matches: usize,
    pub channels: usize,
    pub aux_payloads: usize,
    pub pages_written: usize,
    pub sitemap_urls: usize,
    pub out_dir: PathBuf,
}

/// Renders every page the index describes, in index order. No I/O beyond
/// auxiliary lookups; a template failure on any page fails the whole set.
pub fn render_site(
    index: &SiteIndex<'_>,
    templates: &Templates,
    aux: &mut AuxStore,
    site_url: &str,
) -> Result<(Vec<RenderedPage>, usize)> {
    let ctx = PageContext {
        site_url,
        listings: &index.listings,
    };
    let mut pages = Vec::with_capacity(index.urls.len());
    let mut aux_payloads = 0;

    for listing in &index.listings {
        let entries = index
            .day(listing.date)
            .map(|bucket| bucket.entries.as_slice())
            .unwrap_or_default();
        let body = templates
            .home
            .render(&listing_bindings(&ctx, listing, entries))
            .with_context(|| format!("render listing {}", listing.page.href()))?;
        pages.push(RenderedPage {
            page: listing.page.clone(),
            body,
        });
    }

    for item in &index.details {
        let joined = aux.join(item.record, item.date());
        aux_payloads += joined.available_count();
        let body = templates
            .detail
            .render(&detail_bindings(&ctx, item, &joined))
            .with_context(|| format!("render match {}", item.page.href()))?;
        pages.push(RenderedPage {
            page: item.page.clone(),
            body,
        });
    }

    for channel in &index.channels {
        let body = templates
            .channel
            .render(&channel_bindings(&ctx, channel))
            .with_context(|| format!("render channel {}", channel.page.href()))?;
        pages.push(RenderedPage {
            page: channel.page.clone(),
            body,
        });
    }

    Ok((pages, aux_payloads))
}

/// Runs the whole pipeline once: templates, shards, merge, index, render,
/// write, sitemap. Only template and output failures are returned as errors.
pub fn build_site(cfg: &BuildConfig, now: DateTime<Utc>) -> Result<BuildSummary> {
    let templates = Templates::load(&cfg.template_dir)?;

    let loaded = load_shard_dir(&cfg.shard_dir);
    let mut summary = BuildSummary {
        shards_read: loaded.files_read,
        shards_skipped: loaded.files_skipped,
        records_rejected: loaded.records_rejected,
        out_dir: cfg.out_dir.clone(),
        ..BuildSummary::default()
    };
    if loaded.files_read == 0 {
        warn!("no readable shards in {}", cfg.shard_dir.display());
    }

    let today = cfg.clock.today(now);
    let dataset = apply_window(merge(loaded.records), cfg.merge_window, &cfg.clock, today);
    summary.duplicates_dropped = dataset.duplicates_dropped;
    summary.outside_window = dataset.outside_window;
    summary.matches = dataset.len();
    debug!(
        "merged {} match(es), {} duplicate(s) dropped",
        dataset.len(),
        dataset.duplicates_dropped
    );

    let opts = IndexOptions {
        site_url: cfg.site_url.clone(),
        now,
        today,
        channel_retention: cfg.channel_retention,
        listing_days_before: cfg.listing_days_before,
        listing_days_after: cfg.listing_days_after,
    };
    let index = build_index(&dataset, &cfg.clock, &cfg.sort, &opts);
    summary.channels = index.channels.len();

    let mut aux = AuxStore::new(&cfg.aux_dir);
    let (pages, aux_payloads) = render_site(&index, &templates, &mut aux, &cfg.site_url)?;
    summary.aux_payloads = aux_payloads;

    if cfg.clean_output {
        clean_generated(&cfg.out_dir)?;
    }
    for rendered in &pages {
        write_atomic(&rendered.page.file_in(&cfg.out_dir), rendered.body.as_bytes())?;
    }
    summary.pages_written = pages.len();

    let sitemap = render_sitemap(&index.urls, today);
    write_atomic(&cfg.out_dir.join(SITEMAP_FILE), sitemap.as_bytes())?;
    summary.sitemap_urls = index.urls.len();

    let listed: BTreeSet<String> = index.urls.iter().map(str::to_string).collect();
    if !cfg.clean_output {
        let removed = prune_stale_pages(&cfg.out_dir, &cfg.site_url, &listed)?;
        if removed > 0 {
            info!("removed {removed} stale page(s) from {}", cfg.out_dir.display());
        }
    }
    reconcile(&listed, &cfg.out_dir, &cfg.site_url)?;
    info!(
        "wrote {} page(s) and {} sitemap url(s) to {}",
        summary.pages_written,
        summary.sitemap_urls,
        cfg.out_dir.display()
    );
    Ok(summary)
}

/// The generated pages on disk and the sitemap must name the same URLs.
fn reconcile(listed: &BTreeSet<String>, out_dir: &Path, site_url: &str) -> Result<()> {
    let on_disk = materialized_urls(out_dir, site_url)?;
    if let Some(first) = listed.difference(&on_disk).next() {
        bail!(
            "sitemap lists {} page(s) that were not written, first {first}",
            listed.difference(&on_disk).count()
        );
    }
    if let Some(first) = on_disk.difference(listed).next() {
        bail!(
            "{} page(s) in {} are not in the sitemap, first {first}",
            on_disk.difference(listed).count(),
            out_dir.display()
        );
    }
    Ok(())
}
