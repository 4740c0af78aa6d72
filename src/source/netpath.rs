//! NetPath pathway catalog source adapter.
//!
//! Two zip archives: one carries the pathway labels, the other the
//! per-pathway gene associations. Archives are CRC-verified before use
//! and headers are checked exactly; a mismatch aborts the run and rolls
//! the envelope back.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::Error;
use crate::fetch::{http, FileMap};
use crate::source::{BulkTables, Source, SourceContext};

/// Remote host carrying the archives.
const REMOTE_HOST: &str = "www.netpath.org";
/// Local name of the archive with pathway labels.
const FILE_LABELS: &str = "NetPath_GeneReg_TSV1.zip";
/// Local name of the archive with gene associations.
const FILE_ASSOC: &str = "NetPath_GeneReg_TSV.zip";

/// Expected header of the labels file.
const HEADER_LABELS: &[&str] = &[
    "Gene regulation id",
    "Pathway name",
    "Pathway ID",
    "Gene name",
    "Entrez gene ID",
    "Regulation",
    "Experiment",
    "PubMed ID",
];
/// Expected header of the associations file.
const HEADER_ASSOC: &[&str] = &[
    "Gene regulation id",
    "Pathway name",
    "Pathway id",
    "Gene Name",
    "Entrez Gene",
    "Regulation",
    "Experiment type",
    "PubMed id",
];

/// Row of the labels file; only the pathway columns are used.
#[derive(Debug, serde::Deserialize)]
struct LabelRecord {
    /// Human-readable pathway name.
    #[serde(rename = "Pathway name")]
    pathway_name: String,
    /// NetPath pathway accession.
    #[serde(rename = "Pathway ID")]
    pathway_id: String,
}

/// Row of the associations file.
#[derive(Debug, serde::Deserialize)]
struct AssocRecord {
    /// NetPath pathway accession.
    #[serde(rename = "Pathway id")]
    pathway_id: String,
    /// Gene symbol.
    #[serde(rename = "Gene Name")]
    gene_name: String,
    /// Entrez gene id.
    #[serde(rename = "Entrez Gene")]
    entrez_id: String,
}

/// The NetPath adapter.
pub struct NetPathSource;

impl Source for NetPathSource {
    fn name(&self) -> &'static str {
        "netpath"
    }

    fn download(&self, ctx: &SourceContext) -> Result<(), Error> {
        let files = FileMap::from([
            (FILE_LABELS.to_string(), format!("/data/batch/{}", FILE_LABELS)),
            (FILE_ASSOC.to_string(), format!("/data/batch/{}", FILE_ASSOC)),
        ]);
        http::download_files_from_http(REMOTE_HOST, ctx.dir(), &files)
    }

    fn update(&self, ctx: &SourceContext) -> Result<(), Error> {
        tracing::info!("initializing update process ...");
        ctx.bulk_update(
            BulkTables {
                group: true,
                group_name: true,
                group_region: true,
                ..Default::default()
            },
            |ctx| {
                tracing::info!("deleting old records from the database ...");
                ctx.delete_source_data()?;

                let db = ctx.db();
                let namespace_id = db.add_namespaces(&[
                    ("netpath", false),
                    ("pathway", false),
                    ("gene", false),
                    ("entrez", false),
                ])?;
                let type_id = db.add_types(&["pathway", "gene"])?;

                // process pathways; this file has associations too, but
                // fewer of them, so it only contributes the labels
                tracing::info!("verifying pathway archive ...");
                let path_labels = ctx.local_path(FILE_LABELS);
                verify_zip(&path_labels)?;
                tracing::info!("processing pathways ...");
                let mut path_name: HashMap<String, String> = HashMap::new();
                for_each_record(&path_labels, HEADER_LABELS, |record: LabelRecord| {
                    path_name.insert(record.pathway_id, record.pathway_name);
                    Ok(())
                })?;
                tracing::info!("... OK: {} pathways", path_name.len());

                // store pathways and their names
                tracing::info!("writing pathways to the database ...");
                let path_ids: Vec<&String> = path_name.keys().collect();
                let group_ids = ctx.add_typed_groups(
                    type_id["pathway"],
                    path_ids
                        .iter()
                        .map(|path_id| (path_name[*path_id].clone(), None)),
                )?;
                let path_group: HashMap<&str, i64> = path_ids
                    .iter()
                    .map(|path_id| path_id.as_str())
                    .zip(group_ids.iter().copied())
                    .collect();
                ctx.add_namespaced_group_names(
                    namespace_id["netpath"],
                    path_ids
                        .iter()
                        .map(|path_id| (path_group[path_id.as_str()], (*path_id).clone())),
                )?;
                ctx.add_namespaced_group_names(
                    namespace_id["pathway"],
                    path_ids
                        .iter()
                        .map(|path_id| (path_group[path_id.as_str()], path_name[*path_id].clone())),
                )?;

                // process associations
                tracing::info!("verifying gene association archive ...");
                let path_assoc = ctx.local_path(FILE_ASSOC);
                verify_zip(&path_assoc)?;
                tracing::info!("processing gene associations ...");
                let mut members: HashMap<String, i64> = HashMap::new();
                let mut claims: Vec<(i64, i64, i64, String)> = Vec::new();
                for_each_record(&path_assoc, HEADER_ASSOC, |record: AssocRecord| {
                    let Some(&group) = path_group.get(record.pathway_id.as_str()) else {
                        return Ok(());
                    };
                    let member = members.entry(record.pathway_id).or_insert(0);
                    *member += 1;
                    claims.push((group, *member, namespace_id["entrez"], record.entrez_id));
                    claims.push((group, *member, namespace_id["gene"], record.gene_name));
                    Ok(())
                })?;
                let num_assoc: i64 = members.values().sum();
                tracing::info!(
                    "... OK: {} associations ({} identifiers)",
                    num_assoc,
                    claims.len()
                );

                // store gene associations
                tracing::info!("writing gene associations to the database ...");
                ctx.add_group_region_names(claims)?;

                tracing::info!("finalizing update process ...");
                Ok(())
            },
        )
    }
}

/// Verify the CRC of every archive entry by reading it to the end.
fn verify_zip(path: &Path) -> Result<(), Error> {
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Archive(path.to_path_buf(), e))?;
    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|e| Error::Archive(path.to_path_buf(), e))?;
        std::io::copy(&mut entry, &mut std::io::sink())?;
    }
    Ok(())
}

/// Run `handle` over every record of every TSV file in the archive,
/// checking each file's header exactly.
fn for_each_record<R, F>(path: &Path, header: &[&str], mut handle: F) -> Result<(), Error>
where
    R: serde::de::DeserializeOwned,
    F: FnMut(R) -> Result<(), Error>,
{
    let file = File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Archive(path.to_path_buf(), e))?;
    for idx in 0..archive.len() {
        let entry = archive
            .by_index(idx)
            .map_err(|e| Error::Archive(path.to_path_buf(), e))?;
        let entry_name = entry.name().to_string();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(entry);
        let headers = reader.headers().map_err(|e| {
            Error::InvalidFormat(entry_name.clone(), e.to_string())
        })?;
        if headers.iter().collect::<Vec<_>>() != header {
            return Err(Error::UnexpectedHeader(
                entry_name,
                headers.iter().collect::<Vec<_>>().join("\t"),
            ));
        }
        for record in reader.deserialize() {
            let record: R =
                record.map_err(|e| Error::InvalidFormat(entry_name.clone(), e.to_string()))?;
            handle(record)?;
        }
    }
    Ok(())
}
