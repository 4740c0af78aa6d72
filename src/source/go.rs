//! Gene Ontology source adapter.
//!
//! Stages GO terms as groups of type `ontology`, the `is_a`/`relationship`
//! links between them as mirrored group links, and the human gene
//! association file as membership claims under the `uniprot_id` and
//! `gene` namespaces.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::error::Error;
use crate::fetch::{ftp, FileMap};
use crate::lines::LineReader;
use crate::source::{BulkTables, Source, SourceContext};

/// Remote host carrying the ontology and association files.
const REMOTE_HOST: &str = "ftp.geneontology.org";
/// Local name of the gene association file.
const FILE_ASSOC: &str = "gene_association.goa_human.gz";
/// Local name of the ontology file.
const FILE_OBO: &str = "gene_ontology.1_2.obo";

/// The Gene Ontology adapter.
pub struct GoSource;

impl Source for GoSource {
    fn name(&self) -> &'static str {
        "go"
    }

    fn download(&self, ctx: &SourceContext) -> Result<(), Error> {
        let files = FileMap::from([
            (
                FILE_ASSOC.to_string(),
                format!("/go/gene-associations/{}", FILE_ASSOC),
            ),
            (
                FILE_OBO.to_string(),
                format!("/go/ontology/obo_format_1_2/{}", FILE_OBO),
            ),
        ]);
        ftp::download_files_from_ftp(REMOTE_HOST, ctx.dir(), &files)
    }

    fn update(&self, ctx: &SourceContext) -> Result<(), Error> {
        tracing::info!("initializing update process ...");
        ctx.bulk_update(
            BulkTables {
                group: true,
                group_name: true,
                group_group: true,
                group_region: true,
                ..Default::default()
            },
            |ctx| {
                tracing::info!("deleting old records from the database ...");
                ctx.delete_source_data()?;

                let db = ctx.db();
                let namespace_id = db.add_namespaces(&[
                    ("go_id", false),
                    ("ontology", false),
                    ("gene", false),
                    ("uniprot_id", true),
                ])?;
                let mut relationship_id = db.add_relationships(&["is_a"])?;
                let type_id = db.add_types(&["ontology", "gene"])?;

                // process ontology terms
                tracing::info!("processing ontology terms ...");
                let terms = parse_obo_terms(ctx, &mut relationship_id)?;
                let num_links: usize = terms.values().map(|term| term.links.len()).sum();
                tracing::info!("... OK: {} terms, {} links", terms.len(), num_links);

                // store ontology terms
                tracing::info!("writing ontology terms to the database ...");
                let group_ids = ctx.add_typed_groups(
                    type_id["ontology"],
                    terms
                        .values()
                        .map(|term| (term.name.clone(), term.definition.clone())),
                )?;
                let term_group: HashMap<&str, i64> = terms
                    .keys()
                    .map(String::as_str)
                    .zip(group_ids.iter().copied())
                    .collect();

                // store ontology term names
                tracing::info!("writing ontology term names to the database ...");
                ctx.add_namespaced_group_names(
                    namespace_id["go_id"],
                    terms
                        .keys()
                        .map(|go_id| (term_group[go_id.as_str()], go_id.clone())),
                )?;
                ctx.add_namespaced_group_names(
                    namespace_id["ontology"],
                    terms
                        .iter()
                        .map(|(go_id, term)| (term_group[go_id.as_str()], term.name.clone())),
                )?;

                // store ontology term links; links to unknown terms are dropped
                tracing::info!("writing ontology term links to the database ...");
                let mut links = Vec::new();
                for (go_id, term) in &terms {
                    for (target, relationship) in &term.links {
                        if let Some(&target_group) = term_group.get(target.as_str()) {
                            links.push((term_group[go_id.as_str()], target_group, *relationship));
                        }
                    }
                }
                ctx.add_group_groups(&links)?;

                // process gene associations
                tracing::info!("processing gene associations ...");
                let mut uniprot_assoc: HashSet<(i64, i64, String)> = HashSet::new();
                let mut gene_assoc: HashSet<(i64, i64, String)> = HashSet::new();
                let mut num_assoc = 0i64;
                let mut num_id = 0u64;
                for line in LineReader::open(ctx.local_path(FILE_ASSOC))? {
                    let line = line?;
                    let words: Vec<&str> = line.split('\t').collect();
                    if words.len() < 13 {
                        continue;
                    }
                    let xref_id = words[1];
                    let gene = words[2];
                    let go_id = words[4];
                    let evidence = words[6];
                    let aliases = words[10];
                    let taxon = words[12];

                    // IEA evidence is uncurated; only human associations apply
                    if words[0] != "UniProtKB" || evidence == "IEA" || taxon != "taxon:9606" {
                        continue;
                    }
                    let Some(&group) = term_group.get(go_id) else {
                        continue;
                    };
                    num_assoc += 1;
                    num_id += 2;
                    uniprot_assoc.insert((group, num_assoc, xref_id.to_string()));
                    gene_assoc.insert((group, num_assoc, gene.to_string()));
                    // aliases might be either symbols or UniProt identifiers,
                    // so try them both ways
                    for alias in aliases.split('|').filter(|alias| !alias.is_empty()) {
                        num_id += 1;
                        if alias != xref_id {
                            uniprot_assoc.insert((group, num_assoc, alias.to_string()));
                        }
                        if alias != gene {
                            gene_assoc.insert((group, num_assoc, alias.to_string()));
                        }
                    }
                }
                tracing::info!(
                    "... OK: {} associations ({} identifiers)",
                    num_assoc,
                    num_id
                );

                // store gene associations
                tracing::info!("writing gene associations to the database ...");
                ctx.add_namespaced_group_region_names(namespace_id["uniprot_id"], uniprot_assoc)?;
                ctx.add_namespaced_group_region_names(namespace_id["gene"], gene_assoc)?;

                tracing::info!("finalizing update process ...");
                Ok(())
            },
        )
    }
}

/// One usable ontology term.
#[derive(Debug, Default)]
struct Term {
    name: String,
    definition: Option<String>,
    /// Links as `(target GO id, relationship_id)`.
    links: Vec<(String, i64)>,
}

/// State of the stanza currently being read.
#[derive(Debug, Default)]
struct Stanza {
    kind: String,
    id: Option<String>,
    anonymous: bool,
    obsolete: bool,
    name: Option<String>,
    definition: Option<String>,
    links: Vec<(String, i64)>,
}

impl Stanza {
    /// Fold the stanza into `terms` if it is a usable `[Term]`.
    fn flush(self, terms: &mut IndexMap<String, Term>) {
        if self.kind == "Term" && !self.anonymous && !self.obsolete {
            if let Some(id) = self.id {
                terms.insert(
                    id,
                    Term {
                        name: self.name.unwrap_or_default(),
                        definition: self.definition,
                        links: self.links,
                    },
                );
            }
        }
    }
}

/// Parse the OBO 1.2 file into usable terms.
///
/// Anonymous and obsolete terms are skipped; `relationship` tags beyond
/// `is_a` register their relationship name in the vocabulary on the fly.
fn parse_obo_terms(
    ctx: &SourceContext,
    relationship_id: &mut IndexMap<String, i64>,
) -> Result<IndexMap<String, Term>, Error> {
    let mut terms = IndexMap::new();
    let mut stanza = Stanza::default();

    for line in LineReader::open(ctx.local_path(FILE_OBO))? {
        let line = line?;
        let line = line.split('!').next().unwrap_or("").trim_end();
        let (tag, value) = match line.split_once(':') {
            Some((tag, value)) => (tag.trim(), value.trim()),
            None => (line.trim(), ""),
        };

        if tag.starts_with('[') {
            std::mem::take(&mut stanza).flush(&mut terms);
            stanza.kind = tag.trim_matches(|c| c == '[' || c == ']').to_string();
        } else {
            match tag {
                "id" => stanza.id = Some(value.to_string()),
                "name" => stanza.name = Some(value.to_string()),
                "def" => stanza.definition = parse_quoted(value),
                "is_anonymous" => stanza.anonymous = flag_value(value),
                "is_obsolete" => stanza.obsolete = flag_value(value),
                "is_a" => {
                    if let Some(target) = value.split_whitespace().next() {
                        stanza
                            .links
                            .push((target.to_string(), relationship_id["is_a"]));
                    }
                }
                "relationship" => {
                    let mut words = value.split_whitespace();
                    if let (Some(relationship), Some(target)) = (words.next(), words.next()) {
                        let id = match relationship_id.get(relationship) {
                            Some(&id) => id,
                            None => {
                                let id = ctx.db().add_relationship(relationship)?;
                                relationship_id.insert(relationship.to_string(), id);
                                id
                            }
                        };
                        stanza.links.push((target.to_string(), id));
                    }
                }
                _ => {}
            }
        }
    }
    stanza.flush(&mut terms);

    Ok(terms)
}

/// Read a boolean tag value.
fn flag_value(value: &str) -> bool {
    value
        .split_whitespace()
        .next()
        .map_or(false, |word| word.eq_ignore_ascii_case("true"))
}

/// Extract the leading quoted string of a `def:` value.
///
/// Quotes preceded by an odd number of backslashes do not terminate the
/// string; escapes are kept as written.
fn parse_quoted(value: &str) -> Option<String> {
    let rest = value.strip_prefix('"')?;
    let mut content = String::new();
    for (idx, segment) in rest.split('"').enumerate() {
        if idx > 0 {
            content.push('"');
        }
        content.push_str(segment);
        let trailing = segment.chars().rev().take_while(|&c| c == '\\').count();
        if trailing % 2 == 0 {
            return Some(content);
        }
    }
    // unterminated quote; take the whole rest
    Some(content)
}
