//! UCSC evolutionary-conserved-region (ECR) source adapter.
//!
//! Reads per-chromosome phastCons score tracks in wiggle-fix format, one
//! set per inter-species comparison, extracts conserved regions from the
//! score stream, and stages them as regions with bounds plus one group
//! per comparison whose membership claims go through each region's unique
//! name.

use std::collections::HashMap;

use itertools::iproduct;
use strum::IntoEnumIterator;

use crate::common;
use crate::error::Error;
use crate::fetch::{ftp, FileMap};
use crate::lines::LineReader;
use crate::source::{BulkTables, Source, SourceContext};

/// Remote host carrying the conservation tracks.
const REMOTE_HOST: &str = "hgdownload.cse.ucsc.edu";
/// Remote directory of the hg19 46-way phastCons tracks.
const REMOTE_PATH: &str = "/goldenPath/hg19/phastCons46way";

/// Minimum span of a reported region, in base pairs.
const MIN_SIZE: i64 = 100;
/// Minimum mean conservation score of a reported region.
const MIN_PCT: f64 = 0.7;
/// Maximum number of consecutive below-threshold positions bridged within
/// a region.
const MAX_GAP: i64 = 50;

/// Chromosomes with a conservation track.
const TRACK_CHROMOSOMES: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// Inter-species comparison of a conservation track set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIter)]
pub enum Comparison {
    /// All 46 vertebrates.
    #[strum(serialize = "vertebrate")]
    Vertebrate,
    /// Placental mammal subset.
    #[strum(serialize = "placentalMammals")]
    PlacentalMammals,
    /// Primate subset.
    #[strum(serialize = "primates")]
    Primates,
}

impl Comparison {
    /// Infix of the remote wiggle-fix file names for this comparison.
    fn wig_infix(&self) -> &'static str {
        match self {
            Comparison::Vertebrate => "",
            Comparison::PlacentalMammals => "placental.",
            Comparison::Primates => "primates.",
        }
    }
}

/// Local file name of one comparison/chromosome track.
fn local_file(comparison: Comparison, chromosome: &str) -> String {
    format!("{}.chr{}.phastCons.txt.gz", comparison, chromosome)
}

/// Remote path of one comparison/chromosome track.
fn remote_file(comparison: Comparison, chromosome: &str) -> String {
    let chromosome = if chromosome == "MT" { "M" } else { chromosome };
    format!(
        "{}/{}/chr{}.phastCons46way.{}wigFix.gz",
        REMOTE_PATH,
        comparison,
        chromosome,
        comparison.wig_infix()
    )
}

/// The UCSC ECR adapter.
pub struct UcscEcrSource;

impl Source for UcscEcrSource {
    fn name(&self) -> &'static str {
        "ucsc_ecr"
    }

    fn download(&self, ctx: &SourceContext) -> Result<(), Error> {
        let files: FileMap = iproduct!(Comparison::iter(), TRACK_CHROMOSOMES)
            .map(|(comparison, chromosome)| {
                (
                    local_file(comparison, chromosome),
                    remote_file(comparison, chromosome),
                )
            })
            .collect();
        ftp::download_files_from_ftp(REMOTE_HOST, ctx.dir(), &files)
    }

    fn update(&self, ctx: &SourceContext) -> Result<(), Error> {
        tracing::info!("initializing update process ...");
        ctx.bulk_update(
            BulkTables {
                group: true,
                group_name: true,
                group_region: true,
                region: true,
                region_name: true,
                region_bound: true,
                ..Default::default()
            },
            |ctx| {
                tracing::info!("deleting old records from the database ...");
                ctx.delete_source_data()?;

                let db = ctx.db();
                let namespace = db.add_namespace("ucsc_ecr", false)?;
                let type_ecr = db.add_type("ecr")?;
                let type_ecr_group = db.add_type("ecr_group")?;
                let population = db.add_population("n/a", Some("no LD adjustment"), None)?;

                for comparison in Comparison::iter() {
                    tracing::info!("processing ECRs for {} ...", comparison);
                    let label = format!("ecr_{}", comparison);
                    let group = ctx.add_typed_groups(
                        type_ecr_group,
                        vec![(label.clone(), Some(format!("ECRs for {}", comparison)))],
                    )?[0];
                    ctx.add_namespaced_group_names(namespace, vec![(group, label)])?;

                    let mut member = 0i64;
                    for chromosome in TRACK_CHROMOSOMES {
                        let chr = i64::from(
                            common::chr_num(chromosome).expect("track chromosomes are canonical"),
                        );
                        tracing::info!("processing chromosome {} ...", chromosome);
                        let path = ctx.local_path(&local_file(comparison, chromosome));
                        let regions = extract_regions(LineReader::open(path)?)?;

                        let labels: Vec<String> = regions
                            .iter()
                            .map(|&(start, stop)| {
                                format!("{}:chr{}:{}-{}", comparison, chromosome, start, stop)
                            })
                            .collect();
                        let region_ids = ctx.add_typed_regions(
                            type_ecr,
                            labels.iter().map(|label| (label.clone(), None)),
                        )?;
                        ctx.add_namespaced_region_names(
                            namespace,
                            region_ids
                                .iter()
                                .zip(&labels)
                                .map(|(&region_id, label)| (region_id, label.clone())),
                        )?;
                        ctx.add_population_region_bounds(
                            population,
                            region_ids
                                .iter()
                                .zip(&regions)
                                .map(|(&region_id, &(start, stop))| (region_id, chr, start, stop)),
                        )?;
                        // membership goes through the region's unique name,
                        // which the resolver maps back one-to-one
                        ctx.add_namespaced_group_region_names(
                            namespace,
                            labels.iter().map(|label| {
                                member += 1;
                                (group, member, label.clone())
                            }),
                        )?;
                        tracing::info!("... OK ({} regions found)", regions.len());
                    }
                    tracing::info!("... done with {}", comparison);
                }

                tracing::info!("finalizing update process ...");
                Ok(())
            },
        )
    }
}

/// Extract conserved regions from a wiggle-fix score stream.
///
/// The stream interleaves `fixedStep chrom=… start=N step=K` declarations
/// with one score per line. A region is a run of positions whose running
/// mean stays at or above [`MIN_PCT`]; up to [`MAX_GAP`] consecutive
/// below-threshold positions are bridged. Runs spanning less than
/// [`MIN_SIZE`] base pairs are discarded. Returned tuples are
/// `(start, stop)` positions.
fn extract_regions<I>(lines: I) -> Result<Vec<(i64, i64)>, Error>
where
    I: IntoIterator<Item = Result<String, Error>>,
{
    let mut regions = Vec::new();
    let mut running_sum = 0f64;
    let mut n_pos = 0i64;
    let mut gap = 0i64;
    let mut pos = 1i64;
    let mut start = 1i64;
    let mut stop = 0i64;
    let mut step = 1i64;

    let mut flush = |start: i64, stop: i64| {
        if stop - start >= MIN_SIZE {
            regions.push((start, stop));
        }
    };

    for line in lines {
        let line = line?;
        if let Ok(score) = line.trim().parse::<f64>() {
            if score >= MIN_PCT {
                // a gap that dragged the running mean below the threshold
                // terminates the region; the new run starts fresh
                if gap != 0 && running_sum / (n_pos as f64) < MIN_PCT {
                    flush(start, stop);
                    running_sum = 0.0;
                    n_pos = 0;
                }
                if n_pos == 0 {
                    start = pos;
                }
                stop = pos;
                running_sum += score;
                n_pos += 1;
                gap = 0;
            } else if n_pos != 0 {
                if gap < MAX_GAP {
                    running_sum += score;
                    n_pos += 1;
                    gap += 1;
                } else {
                    // ran off the end of an acceptable gap
                    flush(start, stop);
                    running_sum = 0.0;
                    n_pos = 0;
                    gap = 0;
                    start = 0;
                    stop = 0;
                }
            }
            pos += step;
        } else {
            // declaration line
            let declaration: HashMap<&str, &str> = line
                .split_whitespace()
                .filter_map(|word| word.split_once('='))
                .collect();
            let new_start = declaration.get("start").and_then(|v| v.parse().ok());
            let new_step = declaration.get("step").and_then(|v| v.parse().ok());
            if let (Some(new_start), Some(new_step)) = (new_start, new_step) {
                if new_start != pos || new_step != step {
                    if n_pos > 0 && running_sum / n_pos as f64 >= MIN_PCT && gap < MAX_GAP {
                        flush(start, stop);
                    }
                    running_sum = 0.0;
                    n_pos = 0;
                    gap = 0;
                    pos = new_start;
                    start = new_start;
                    stop = 0;
                    step = new_step;
                }
            }
        }
    }
    if n_pos > 0 && running_sum / n_pos as f64 >= MIN_PCT && gap < MAX_GAP {
        flush(start, stop);
    }

    Ok(regions)
}
