//! Per-adapter staging context and the bulk-update envelope.

use std::path::{Path, PathBuf};

use rusqlite::params;

use crate::db::Database;
use crate::error::Error;

/// Flags naming the tables an adapter is about to bulk-load.
///
/// The envelope strips the secondary indexes of the flagged tables for the
/// duration of the load and schedules the derived-table rebuilds that the
/// flags imply.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkTables {
    /// The `group` table.
    pub group: bool,
    /// The `group_name` table.
    pub group_name: bool,
    /// The `group_group` table.
    pub group_group: bool,
    /// The `group_region_name` staging table behind `group_region`.
    pub group_region: bool,
    /// The `region` table.
    pub region: bool,
    /// The `region_name` table.
    pub region_name: bool,
    /// The `region_bound` table.
    pub region_bound: bool,
    /// The `snp` table.
    pub snp: bool,
    /// The `snp_merge` table.
    pub snp_merge: bool,
    /// The `snp_role_entrez` staging table behind `snp_role`.
    pub snp_role: bool,
}

impl BulkTables {
    /// The staging tables whose secondary indexes are dropped.
    fn affected(&self) -> Vec<&'static str> {
        let mut tables = Vec::new();
        if self.group {
            tables.push("group");
        }
        if self.group_name {
            tables.push("group_name");
        }
        if self.group_group {
            tables.push("group_group");
        }
        if self.group_region {
            tables.push("group_region_name");
        }
        if self.region {
            tables.push("region");
        }
        if self.region_name {
            tables.push("region_name");
        }
        if self.region_bound {
            tables.push("region_bound");
        }
        if self.snp {
            tables.push("snp");
        }
        if self.snp_merge {
            tables.push("snp_merge");
        }
        if self.snp_role {
            tables.push("snp_role_entrez");
        }
        tables
    }
}

/// Handle through which one adapter stages its rows.
///
/// Binds the shared [`Database`] to the adapter's `source_id` and working
/// directory; every staged row carries that `source_id` so a re-ingest can
/// wipe exactly this source's rows first.
pub struct SourceContext<'a> {
    db: &'a Database,
    dir: PathBuf,
    source_id: i64,
}

impl<'a> SourceContext<'a> {
    /// Bind `source_name` to the knowledge base, materializing its
    /// `source` vocabulary entry.
    pub fn new(
        db: &'a Database,
        source_name: &str,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, Error> {
        let source_id = db.add_source(source_name)?;
        debug_assert!(source_id > 0);
        Ok(Self {
            db,
            dir: dir.into(),
            source_id,
        })
    }

    /// The underlying knowledge base handle.
    pub fn db(&self) -> &Database {
        self.db
    }

    /// The working directory holding this source's downloaded files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The id of this adapter's `source` vocabulary entry.
    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    /// Path of a downloaded file in the working directory.
    pub fn local_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    // -- bulk-update envelope ------------------------------------------

    /// Run `body` inside the bulk-update envelope.
    ///
    /// Opens a transaction, drops the secondary indexes of the flagged
    /// tables, and hands control to `body`. On success the indexes are
    /// recreated, the derived tables implied by the flags are rebuilt
    /// (`region_bound` -> zones; `region_name` or `snp_role` -> SNP roles;
    /// `region_name` or `group_region` -> group regions), and the
    /// transaction commits. On error the transaction rolls back, which
    /// also restores the dropped indexes.
    pub fn bulk_update<F>(&self, tables: BulkTables, body: F) -> Result<(), Error>
    where
        F: FnOnce(&Self) -> Result<(), Error>,
    {
        self.db.begin()?;
        match self.bulk_update_inner(&tables, body) {
            Ok(()) => self.db.commit(),
            Err(e) => {
                if let Err(rollback_error) = self.db.rollback() {
                    tracing::error!("rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }

    fn bulk_update_inner<F>(&self, tables: &BulkTables, body: F) -> Result<(), Error>
    where
        F: FnOnce(&Self) -> Result<(), Error>,
    {
        let affected = tables.affected();
        for table in &affected {
            self.db.drop_table_indexes(table)?;
        }

        body(self)?;

        for table in &affected {
            self.db.create_table_indexes(table)?;
        }
        if tables.region_bound {
            self.db.update_region_zones()?;
        }
        if tables.region_name || tables.snp_role {
            self.db.resolve_snp_roles()?;
        }
        if tables.region_name || tables.group_region {
            self.db.resolve_group_regions()?;
        }
        Ok(())
    }

    // -- scoped deletion -----------------------------------------------

    /// Delete every staged row carrying this adapter's `source_id`.
    pub fn delete_source_data(&self) -> Result<(), Error> {
        let conn = self.db.connection();
        for table in [
            "\"group\"",
            "group_name",
            "group_group",
            "group_region_name",
            "region",
            "region_name",
            "region_bound",
            "snp",
            "snp_merge",
            "snp_role_entrez",
        ] {
            conn.execute(
                &format!("DELETE FROM {} WHERE source_id = ?1", table),
                params![self.source_id],
            )?;
        }
        Ok(())
    }

    // -- group staging -------------------------------------------------

    /// Insert groups given as `(type_id, label, description)`, returning
    /// the new group ids in input order.
    pub fn add_groups<I>(&self, groups: I) -> Result<Vec<i64>, Error>
    where
        I: IntoIterator<Item = (i64, String, Option<String>)>,
    {
        let conn = self.db.connection();
        let mut insert = conn.prepare(
            "INSERT INTO \"group\" (type_id, label, description, source_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut ids = Vec::new();
        for (type_id, label, description) in groups {
            insert.execute(params![type_id, label, description, self.source_id])?;
            ids.push(conn.last_insert_rowid());
        }
        Ok(ids)
    }

    /// Insert groups of one type given as `(label, description)`.
    pub fn add_typed_groups<I>(&self, type_id: i64, groups: I) -> Result<Vec<i64>, Error>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        self.add_groups(
            groups
                .into_iter()
                .map(|(label, description)| (type_id, label, description)),
        )
    }

    /// Insert group aliases given as `(group_id, namespace_id, name)`;
    /// duplicates are ignored.
    pub fn add_group_names<I>(&self, names: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, String)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO group_name (group_id, namespace_id, name, source_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (group_id, namespace_id, name) in names {
            insert.execute(params![group_id, namespace_id, name, self.source_id])?;
        }
        Ok(())
    }

    /// Insert group aliases in one namespace given as `(group_id, name)`.
    pub fn add_namespaced_group_names<I>(&self, namespace_id: i64, names: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        self.add_group_names(
            names
                .into_iter()
                .map(|(group_id, name)| (group_id, namespace_id, name)),
        )
    }

    /// Insert directed group relations given as
    /// `(group_id, related_group_id, relationship_id)`.
    ///
    /// Every link is stored symmetrically: the given direction with `+1`
    /// and the mirrored pair with `-1`.
    pub fn add_group_groups(&self, links: &[(i64, i64, i64)]) -> Result<(), Error> {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO group_group \
             (group_id, related_group_id, relationship_id, direction, source_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (group_id, related_group_id, relationship_id) in links {
            insert.execute(params![
                group_id,
                related_group_id,
                relationship_id,
                1,
                self.source_id
            ])?;
        }
        for (group_id, related_group_id, relationship_id) in links {
            insert.execute(params![
                related_group_id,
                group_id,
                relationship_id,
                -1,
                self.source_id
            ])?;
        }
        Ok(())
    }

    /// Insert membership claims given as
    /// `(group_id, member, namespace_id, name)`; duplicates are ignored.
    ///
    /// `member` is the per-group ordinal tying multiple aliases of the
    /// same intended entity together.
    pub fn add_group_region_names<I>(&self, claims: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, i64, String)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO group_region_name \
             (group_id, member, namespace_id, name, source_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (group_id, member, namespace_id, name) in claims {
            insert.execute(params![group_id, member, namespace_id, name, self.source_id])?;
        }
        Ok(())
    }

    /// Insert membership claims in one namespace given as
    /// `(group_id, member, name)`.
    pub fn add_namespaced_group_region_names<I>(
        &self,
        namespace_id: i64,
        claims: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, String)>,
    {
        self.add_group_region_names(
            claims
                .into_iter()
                .map(|(group_id, member, name)| (group_id, member, namespace_id, name)),
        )
    }

    // -- region staging ------------------------------------------------

    /// Insert regions given as `(type_id, label, description)`, returning
    /// the new region ids in input order.
    pub fn add_regions<I>(&self, regions: I) -> Result<Vec<i64>, Error>
    where
        I: IntoIterator<Item = (i64, String, Option<String>)>,
    {
        let conn = self.db.connection();
        let mut insert = conn.prepare(
            "INSERT INTO region (type_id, label, description, source_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut ids = Vec::new();
        for (type_id, label, description) in regions {
            insert.execute(params![type_id, label, description, self.source_id])?;
            ids.push(conn.last_insert_rowid());
        }
        Ok(ids)
    }

    /// Insert regions of one type given as `(label, description)`.
    pub fn add_typed_regions<I>(&self, type_id: i64, regions: I) -> Result<Vec<i64>, Error>
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        self.add_regions(
            regions
                .into_iter()
                .map(|(label, description)| (type_id, label, description)),
        )
    }

    /// Insert region aliases given as `(region_id, namespace_id, name)`;
    /// duplicates are ignored.
    pub fn add_region_names<I>(&self, names: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, String)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO region_name (region_id, namespace_id, name, source_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (region_id, namespace_id, name) in names {
            insert.execute(params![region_id, namespace_id, name, self.source_id])?;
        }
        Ok(())
    }

    /// Insert region aliases in one namespace given as `(region_id, name)`.
    pub fn add_namespaced_region_names<I>(&self, namespace_id: i64, names: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        self.add_region_names(
            names
                .into_iter()
                .map(|(region_id, name)| (region_id, namespace_id, name)),
        )
    }

    /// Insert region bounds given as
    /// `(region_id, population_id, chr, pos_a, pos_b)`; the two positions
    /// are stored as `(min, max)` regardless of input order. Duplicates
    /// are ignored.
    pub fn add_region_bounds<I>(&self, bounds: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, i64, i64, i64)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO region_bound \
             (region_id, population_id, chr, posMin, posMax, source_id) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (region_id, population_id, chr, pos_a, pos_b) in bounds {
            insert.execute(params![
                region_id,
                population_id,
                chr,
                pos_a.min(pos_b),
                pos_a.max(pos_b),
                self.source_id
            ])?;
        }
        Ok(())
    }

    /// Insert region bounds in one population given as
    /// `(region_id, chr, pos_a, pos_b)`.
    pub fn add_population_region_bounds<I>(
        &self,
        population_id: i64,
        bounds: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, i64, i64)>,
    {
        self.add_region_bounds(
            bounds
                .into_iter()
                .map(|(region_id, chr, pos_a, pos_b)| {
                    (region_id, population_id, chr, pos_a, pos_b)
                }),
        )
    }

    // -- SNP staging ---------------------------------------------------

    /// Insert SNPs given as `(rs, chr, pos)`; duplicates are allowed.
    pub fn add_snps<I>(&self, snps: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, i64)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT INTO snp (rs, chr, pos, source_id) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (rs, chr, pos) in snps {
            insert.execute(params![rs, chr, pos, self.source_id])?;
        }
        Ok(())
    }

    /// Insert SNPs on one chromosome given as `(rs, pos)`.
    pub fn add_chromosome_snps<I>(&self, chr: i64, snps: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64)>,
    {
        self.add_snps(snps.into_iter().map(|(rs, pos)| (rs, chr, pos)))
    }

    /// Insert rs-id merge history given as `(rs_old, rs_new, rs_cur)`.
    pub fn add_snp_merges<I>(&self, merges: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, i64, i64)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT INTO snp_merge (rsOld, rsNew, rsCur, source_id) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (rs_old, rs_new, rs_cur) in merges {
            insert.execute(params![rs_old, rs_new, rs_cur, self.source_id])?;
        }
        Ok(())
    }

    /// Insert Entrez-keyed SNP role claims given as `(rs, entrez, role_id)`;
    /// duplicates are ignored.
    pub fn add_entrez_snp_roles<I>(&self, roles: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (i64, String, i64)>,
    {
        let mut insert = self.db.connection().prepare(
            "INSERT OR IGNORE INTO snp_role_entrez (rs, region_entrez, role_id, source_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (rs, entrez, role_id) in roles {
            insert.execute(params![rs, entrez, role_id, self.source_id])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rusqlite::params;

    use super::*;

    fn scaffold(db: &Database) -> SourceContext<'_> {
        SourceContext::new(db, "test", "/tmp").unwrap()
    }

    #[test]
    fn group_links_are_mirrored() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("ontology")?;
        let rel = db.add_relationship("is_a")?;
        let ids = ctx.add_typed_groups(
            type_id,
            vec![
                ("parent".to_string(), None),
                ("child".to_string(), None),
            ],
        )?;

        ctx.add_group_groups(&[(ids[1], ids[0], rel)])?;

        let rows: Vec<(i64, i64, i64)> = db
            .connection()
            .prepare(
                "SELECT group_id, related_group_id, direction FROM group_group \
                 ORDER BY direction DESC",
            )?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(rows, vec![(ids[1], ids[0], 1), (ids[0], ids[1], -1)]);
        Ok(())
    }

    #[test]
    fn bounds_are_canonicalized() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("gene")?;
        let pop = db.add_population("n/a", None, None)?;
        let region = ctx.add_typed_regions(type_id, vec![("TGDS".to_string(), None)])?[0];

        ctx.add_population_region_bounds(pop, vec![(region, 13, 95_248_511, 95_226_305)])?;

        let (pos_min, pos_max): (i64, i64) = db.connection().query_row(
            "SELECT posMin, posMax FROM region_bound WHERE region_id = ?1",
            params![region],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        assert_eq!((pos_min, pos_max), (95_226_305, 95_248_511));
        Ok(())
    }

    #[test]
    fn name_inserts_are_silent_on_duplicate() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("pathway")?;
        let ns = db.add_namespace("pathway", false)?;
        let group = ctx.add_typed_groups(type_id, vec![("wnt".to_string(), None)])?[0];

        ctx.add_namespaced_group_names(ns, vec![(group, "wnt".to_string())])?;
        ctx.add_namespaced_group_names(ns, vec![(group, "wnt".to_string())])?;
        assert_eq!(db.count_rows("group_name")?, 1);

        // groups themselves allow duplicate labels
        ctx.add_typed_groups(type_id, vec![("wnt".to_string(), None)])?;
        assert_eq!(db.count_rows("group")?, 2);
        Ok(())
    }

    #[test]
    fn member_ordinals_tie_aliases_together() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("pathway")?;
        let ns_gene = db.add_namespace("gene", false)?;
        let ns_entrez = db.add_namespace("entrez", false)?;
        let group = ctx.add_typed_groups(type_id, vec![("p53".to_string(), None)])?[0];

        ctx.add_group_region_names(vec![
            (group, 1, ns_gene, "TP53".to_string()),
            (group, 1, ns_entrez, "7157".to_string()),
            (group, 2, ns_gene, "MDM2".to_string()),
        ])?;

        let members: i64 = db.connection().query_row(
            "SELECT COUNT(DISTINCT member) FROM group_region_name WHERE group_id = ?1",
            params![group],
            |row| row.get(0),
        )?;
        assert_eq!(members, 2);
        assert_eq!(db.count_rows("group_region_name")?, 3);
        Ok(())
    }

    #[test]
    fn delete_source_data_is_scoped() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx_a = SourceContext::new(&db, "alpha", "/tmp")?;
        let ctx_b = SourceContext::new(&db, "beta", "/tmp")?;
        let type_id = db.add_type("gene")?;

        ctx_a.add_typed_regions(type_id, vec![("A1".to_string(), None)])?;
        ctx_b.add_typed_regions(type_id, vec![("B1".to_string(), None)])?;
        ctx_a.add_snps(vec![(42, 1, 1000)])?;

        ctx_a.delete_source_data()?;

        assert_eq!(db.count_rows("region")?, 1);
        assert_eq!(db.count_rows("snp")?, 0);
        let label: String =
            db.connection()
                .query_row("SELECT label FROM region", [], |row| row.get(0))?;
        assert_eq!(label, "B1");
        Ok(())
    }

    #[test]
    fn envelope_commits_and_rebuilds_derived_tables() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("gene")?;
        let ns = db.add_namespace("hgnc", false)?;
        let pop = db.add_population("n/a", None, None)?;

        ctx.bulk_update(
            BulkTables {
                group: true,
                group_region: true,
                region: true,
                region_name: true,
                region_bound: true,
                ..Default::default()
            },
            |ctx| {
                ctx.delete_source_data()?;
                let region =
                    ctx.add_typed_regions(type_id, vec![("BRCA1".to_string(), None)])?[0];
                ctx.add_namespaced_region_names(ns, vec![(region, "BRCA1".to_string())])?;
                ctx.add_population_region_bounds(
                    pop,
                    vec![(region, 17, 41_196_312, 41_277_500)],
                )?;
                let group = ctx.add_typed_groups(
                    type_id,
                    vec![("brca pathway".to_string(), None)],
                )?[0];
                ctx.add_namespaced_group_region_names(
                    ns,
                    vec![(group, 1, "BRCA1".to_string())],
                )?;
                Ok(())
            },
        )?;

        // hooks ran: zones and resolved group regions exist
        assert_eq!(db.count_rows("region_zone")?, 2);
        assert_eq!(db.count_rows("group_region")?, 1);
        let (specificity, implication, quality): (i64, i64, i64) =
            db.connection().query_row(
                "SELECT specificity, implication, quality FROM group_region",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
        assert_eq!((specificity, implication, quality), (100, 100, 100));
        Ok(())
    }

    #[test]
    fn envelope_rolls_back_on_error() -> Result<(), Error> {
        let db = Database::open_in_memory()?;
        let ctx = scaffold(&db);
        let type_id = db.add_type("gene")?;

        let result = ctx.bulk_update(
            BulkTables {
                region: true,
                ..Default::default()
            },
            |ctx| {
                ctx.add_typed_regions(type_id, vec![("DOOMED".to_string(), None)])?;
                Err(Error::InvalidFormat("input.tsv".into(), "boom".into()))
            },
        );

        assert!(matches!(result, Err(Error::InvalidFormat(_, _))));
        assert_eq!(db.count_rows("region")?, 0);

        // the rollback also restored the dropped index
        let indexes: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'index' AND name = 'region__label'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(indexes, 1);
        Ok(())
    }
}
