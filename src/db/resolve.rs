//! Derived-table rebuilders.
//!
//! All three rebuilders are total reconstructions: they truncate their
//! output table and regenerate it from the staging tables. They are driven
//! by the bulk-update envelope after staging finishes, but can also be run
//! standalone.

use rusqlite::params;

use crate::db::Database;
use crate::error::Error;

/// Size of a spatial zone in base pairs.
pub const ZONE_SIZE: i64 = 100_000;

/// Scores for each name match reachable from a membership claim.
const SQL_SCORE_TABLE: &str = "\
CREATE TEMP TABLE group_region_name_score (
  group_id INTEGER NOT NULL,
  member INTEGER NOT NULL,
  region_id INTEGER NOT NULL,
  multigene TINYINT NOT NULL,
  implication INTEGER NOT NULL,
  quality INTEGER NOT NULL,
  PRIMARY KEY (group_id, member, region_id)
)";

/// Populate the score table.
///
/// The inner query computes, per alias of a member, how many distinct
/// regions that alias matches globally (`region_count`). The outer query
/// then fans each alias out to its matched regions and aggregates per
/// `(group, member, region)`: whether any alias namespace is multigene,
/// how many distinct aliases imply the region, and the summed quality
/// where an alias identifying `n` regions contributes `1000 / n`.
const SQL_SCORE_INSERT: &str = "\
INSERT INTO group_region_name_score
SELECT
  group_id,
  member,
  region_id,
  MAX(multigene) AS multigene,
  COUNT(DISTINCT rn.namespace_id || '.' || rn.name) AS implication,
  SUM(1000 / region_count) AS quality
FROM (
  SELECT
    group_id,
    member,
    namespace_id,
    name,
    COUNT(DISTINCT region_id) AS region_count
  FROM group_region_name
  JOIN region_name USING (namespace_id, name)
  GROUP BY group_id, member, namespace_id, name
)
JOIN region_name AS rn USING (namespace_id, name)
JOIN namespace AS n USING (namespace_id)
GROUP BY group_id, member, region_id";

/// Reduce the scores to `(group, region)` assignments with confidences.
///
/// Innermost: best score per member. Middle: how many matches share that
/// best score. Outer: per-triple confidence per the three-way case split
/// (multigene match, member-is-multigene, scored). Topmost: collapse to
/// group level by taking the column-wise maximum.
const SQL_GROUP_REGION_INSERT: &str = "\
INSERT INTO group_region
SELECT
  group_id,
  region_id,
  MAX(specificity) AS specificity,
  MAX(implication) AS implication,
  MAX(quality) AS quality
FROM (
  SELECT
    group_id,
    member,
    region_id,
    (CASE
      WHEN multigene = 1 THEN 100
      WHEN member_multigene = 1 THEN 1
      ELSE 100 / count_basic
    END) AS specificity,
    (CASE
      WHEN multigene = 1 THEN 100
      WHEN member_multigene = 1 THEN 1
      WHEN implication = member_implication THEN 100 / count_implication
      ELSE 0
    END) AS implication,
    (CASE
      WHEN multigene = 1 THEN 100
      WHEN member_multigene = 1 THEN 1
      WHEN quality = member_quality THEN 100 / count_quality
      ELSE 0
    END) AS quality
  FROM (
    SELECT
      group_id,
      member,
      member_multigene,
      COUNT(DISTINCT region_id) AS count_basic,
      member_implication,
      SUM(CASE WHEN implication = member_implication THEN 1 ELSE 0 END) AS count_implication,
      member_quality,
      SUM(CASE WHEN quality = member_quality THEN 1 ELSE 0 END) AS count_quality
    FROM (
      SELECT
        group_id,
        member,
        MAX(multigene) AS member_multigene,
        MAX(implication) AS member_implication,
        MAX(quality) AS member_quality
      FROM group_region_name_score
      GROUP BY group_id, member
    )
    JOIN group_region_name_score USING (group_id, member)
    GROUP BY group_id, member
  )
  JOIN group_region_name_score USING (group_id, member)
  GROUP BY group_id, member, region_id
)
GROUP BY group_id, region_id";

/// One placeholder row per group counting the members none of whose
/// aliases matched any region; `region_id = 0` marks the placeholder.
const SQL_PLACEHOLDER_INSERT: &str = "\
INSERT OR IGNORE INTO group_region
SELECT
  group_id,
  0 AS region_id,
  100 * COUNT(*) AS specificity,
  100 * COUNT(*) AS implication,
  100 * COUNT(*) AS quality
FROM (
  SELECT group_id
  FROM group_region_name
  LEFT JOIN region_name USING (namespace_id, name)
  GROUP BY group_id, member
  HAVING MAX(region_id) IS NULL
)
GROUP BY group_id";

impl Database {
    /// Rebuild the `region_zone` spatial index from `region_bound`.
    ///
    /// Every bound `(posMin, posMax)` is projected onto all zones `z` with
    /// `posMin / ZONE_SIZE <= z <= posMax / ZONE_SIZE`.
    pub fn update_region_zones(&self) -> Result<(), Error> {
        let conn = self.connection();
        let max_pos: Option<i64> =
            conn.query_row("SELECT MAX(posMax) FROM region_bound", [], |row| row.get(0))?;

        self.drop_table_indexes("region_zone")?;
        conn.execute("DELETE FROM region_zone", [])?;

        if let Some(max_pos) = max_pos {
            conn.execute(
                "CREATE TEMP TABLE zones (zone INTEGER PRIMARY KEY NOT NULL)",
                [],
            )?;
            {
                let mut insert = conn.prepare("INSERT INTO zones (zone) VALUES (?1)")?;
                for zone in 0..=(max_pos / ZONE_SIZE) {
                    insert.execute(params![zone])?;
                }
            }
            conn.execute(
                "INSERT OR IGNORE INTO region_zone (region_id, population_id, chr, zone)
                 SELECT rb.region_id, rb.population_id, rb.chr, tz.zone
                 FROM region_bound AS rb
                 JOIN zones AS tz
                   ON tz.zone >= rb.posMin / ?1
                  AND tz.zone <= rb.posMax / ?2",
                params![ZONE_SIZE, ZONE_SIZE],
            )?;
            conn.execute("DROP TABLE zones", [])?;
        }

        self.create_table_indexes("region_zone")?;
        Ok(())
    }

    /// Rebuild `snp_role` by joining the Entrez-keyed role claims through
    /// `region_name` at the `entrez_id` namespace.
    ///
    /// Claims whose Entrez id has no region mapping yet are silently
    /// dropped; they may resolve after a later source import.
    pub fn resolve_snp_roles(&self) -> Result<(), Error> {
        let entrez_ns = self.add_namespace("entrez_id", false)?;

        self.drop_table_indexes("snp_role")?;
        let conn = self.connection();
        conn.execute("DELETE FROM snp_role", [])?;
        conn.execute(
            "INSERT OR IGNORE INTO snp_role
             SELECT rsr.rs, rn.region_id, rsr.role_id
             FROM snp_role_entrez AS rsr
             JOIN region_name AS rn
               ON rn.namespace_id = ?1 AND rn.name = rsr.region_entrez",
            params![entrez_ns],
        )?;
        self.create_table_indexes("snp_role")?;
        Ok(())
    }

    /// Rebuild `group_region` from the textual membership claims in
    /// `group_region_name`.
    ///
    /// Multi-pass scoring: materialize per-`(group, member, region)`
    /// scores, reduce to the best score per member, convert to the three
    /// confidence scalars, collapse to `(group, region)` by column-wise
    /// maximum, and finally emit one placeholder row per group counting
    /// its completely unmatched members.
    pub fn resolve_group_regions(&self) -> Result<(), Error> {
        let conn = self.connection();
        conn.execute(SQL_SCORE_TABLE, [])?;
        conn.execute(SQL_SCORE_INSERT, [])?;

        self.drop_table_indexes("group_region")?;
        conn.execute("DELETE FROM group_region", [])?;
        conn.execute(SQL_GROUP_REGION_INSERT, [])?;
        conn.execute(SQL_PLACEHOLDER_INSERT, [])?;

        conn.execute("DROP TABLE group_region_name_score", [])?;
        self.create_table_indexes("group_region")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rusqlite::params;

    use super::*;

    /// Scaffold with the namespaces and vocabulary the scenarios share.
    struct Scaffold {
        db: Database,
        ns_hgnc: i64,
        ns_uniprot: i64,
        type_gene: i64,
        type_pathway: i64,
        source_id: i64,
    }

    impl Scaffold {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let ns_hgnc = db.add_namespace("hgnc", false).unwrap();
            let ns_uniprot = db.add_namespace("uniprot_id", true).unwrap();
            let type_gene = db.add_type("gene").unwrap();
            let type_pathway = db.add_type("pathway").unwrap();
            let source_id = db.add_source("test").unwrap();
            Self {
                db,
                ns_hgnc,
                ns_uniprot,
                type_gene,
                type_pathway,
                source_id,
            }
        }

        fn add_group(&self, label: &str) -> i64 {
            self.db
                .connection()
                .execute(
                    "INSERT INTO \"group\" (type_id, label, source_id) VALUES (?1, ?2, ?3)",
                    params![self.type_pathway, label, self.source_id],
                )
                .unwrap();
            self.db.connection().last_insert_rowid()
        }

        fn add_region(&self, label: &str) -> i64 {
            self.db
                .connection()
                .execute(
                    "INSERT INTO region (type_id, label, source_id) VALUES (?1, ?2, ?3)",
                    params![self.type_gene, label, self.source_id],
                )
                .unwrap();
            self.db.connection().last_insert_rowid()
        }

        fn add_region_name(&self, region_id: i64, namespace_id: i64, name: &str) {
            self.db
                .connection()
                .execute(
                    "INSERT OR IGNORE INTO region_name \
                     (region_id, namespace_id, name, source_id) VALUES (?1, ?2, ?3, ?4)",
                    params![region_id, namespace_id, name, self.source_id],
                )
                .unwrap();
        }

        fn add_claim(&self, group_id: i64, member: i64, namespace_id: i64, name: &str) {
            self.db
                .connection()
                .execute(
                    "INSERT OR IGNORE INTO group_region_name \
                     (group_id, member, namespace_id, name, source_id) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![group_id, member, namespace_id, name, self.source_id],
                )
                .unwrap();
        }

        fn group_regions(&self) -> Vec<(i64, i64, i64, i64, i64)> {
            let mut stmt = self
                .db
                .connection()
                .prepare(
                    "SELECT group_id, region_id, specificity, implication, quality \
                     FROM group_region ORDER BY group_id, region_id",
                )
                .unwrap();
            stmt.query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
        }
    }

    #[test]
    fn zones_span_bound() -> Result<(), Error> {
        let s = Scaffold::new();
        let region = s.add_region("TGDS");
        s.db.connection().execute(
            "INSERT INTO region_bound \
             (region_id, population_id, chr, posMin, posMax, source_id) \
             VALUES (?1, 1, 1, 99000, 250000, ?2)",
            params![region, s.source_id],
        )?;

        s.db.update_region_zones()?;

        let mut stmt = s
            .db
            .connection()
            .prepare("SELECT zone FROM region_zone WHERE region_id = ?1 ORDER BY zone")?;
        let zones: Vec<i64> = stmt
            .query_map(params![region], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(zones, vec![0, 1, 2]);

        Ok(())
    }

    #[test]
    fn zones_are_rebuilt_not_appended() -> Result<(), Error> {
        let s = Scaffold::new();
        let region = s.add_region("TGDS");
        s.db.connection().execute(
            "INSERT INTO region_bound \
             (region_id, population_id, chr, posMin, posMax, source_id) \
             VALUES (?1, 1, 1, 500000, 700000, ?2)",
            params![region, s.source_id],
        )?;
        s.db.update_region_zones()?;
        assert_eq!(s.db.count_rows("region_zone")?, 3);

        s.db.connection()
            .execute("DELETE FROM region_bound", [])?;
        s.db.connection().execute(
            "INSERT INTO region_bound \
             (region_id, population_id, chr, posMin, posMax, source_id) \
             VALUES (?1, 1, 1, 0, 50000, ?2)",
            params![region, s.source_id],
        )?;
        s.db.update_region_zones()?;

        let zones: Vec<i64> = s
            .db
            .connection()
            .prepare("SELECT zone FROM region_zone ORDER BY zone")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(zones, vec![0]);

        Ok(())
    }

    #[test]
    fn zones_tolerate_empty_bounds() -> Result<(), Error> {
        let s = Scaffold::new();
        s.db.update_region_zones()?;
        assert_eq!(s.db.count_rows("region_zone")?, 0);
        Ok(())
    }

    #[test]
    fn snp_roles_join_through_entrez() -> Result<(), Error> {
        let s = Scaffold::new();
        let entrez_ns = s.db.add_namespace("entrez_id", false)?;
        let role = s.db.add_role("exon", None, Some(true), Some(true))?;

        let brca1 = s.add_region("BRCA1");
        s.add_region_name(brca1, entrez_ns, "672");

        for (rs, entrez) in [(429358, "672"), (7412, "348"), (6025, "672")] {
            s.db.connection().execute(
                "INSERT OR IGNORE INTO snp_role_entrez \
                 (rs, region_entrez, role_id, source_id) VALUES (?1, ?2, ?3, ?4)",
                params![rs, entrez, role, s.source_id],
            )?;
        }

        s.db.resolve_snp_roles()?;

        // rs7412 points at Entrez 348 which no region claims; it is dropped.
        let rows: Vec<(i64, i64, i64)> = s
            .db
            .connection()
            .prepare("SELECT rs, region_id, role_id FROM snp_role ORDER BY rs")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(rows, vec![(6025, brca1, role), (429358, brca1, role)]);

        Ok(())
    }

    #[test]
    fn resolver_clean_mapping() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("dna repair");
        let region = s.add_region("BRCA1");
        s.add_region_name(region, s.ns_hgnc, "BRCA1");
        s.add_claim(group, 1, s.ns_hgnc, "BRCA1");

        s.db.resolve_group_regions()?;

        assert_eq!(s.group_regions(), vec![(group, region, 100, 100, 100)]);
        Ok(())
    }

    #[test]
    fn resolver_ambiguous_alias_splits_confidence() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("histones");
        let regions: Vec<i64> = (0..5)
            .map(|idx| {
                let region = s.add_region(&format!("HIST1H{}", idx));
                s.add_region_name(region, s.ns_hgnc, "H1");
                region
            })
            .collect();
        s.add_claim(group, 1, s.ns_hgnc, "H1");

        s.db.resolve_group_regions()?;

        let expected: Vec<(i64, i64, i64, i64, i64)> = regions
            .iter()
            .map(|&region| (group, region, 20, 20, 20))
            .collect();
        assert_eq!(s.group_regions(), expected);
        Ok(())
    }

    #[test]
    fn resolver_multigene_alias_keeps_full_confidence() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("kinases");
        let regions: Vec<i64> = (0..3)
            .map(|idx| {
                let region = s.add_region(&format!("KIN{}", idx));
                s.add_region_name(region, s.ns_uniprot, "P12345");
                region
            })
            .collect();
        s.add_claim(group, 1, s.ns_uniprot, "P12345");

        s.db.resolve_group_regions()?;

        let expected: Vec<(i64, i64, i64, i64, i64)> = regions
            .iter()
            .map(|&region| (group, region, 100, 100, 100))
            .collect();
        assert_eq!(s.group_regions(), expected);
        Ok(())
    }

    #[test]
    fn resolver_implication_agreement_breaks_ties() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("pathway");
        let r1 = s.add_region("GENE1");
        let r2 = s.add_region("GENE2");
        // alias "a" identifies r1 alone; alias "b" is shared by r1 and r2
        s.add_region_name(r1, s.ns_hgnc, "a");
        s.add_region_name(r1, s.ns_hgnc, "b");
        s.add_region_name(r2, s.ns_hgnc, "b");
        s.add_claim(group, 1, s.ns_hgnc, "a");
        s.add_claim(group, 1, s.ns_hgnc, "b");

        s.db.resolve_group_regions()?;

        // r1 is implied by both aliases (best implication and quality);
        // r2 only splits the shared alias.
        assert_eq!(
            s.group_regions(),
            vec![(group, r1, 50, 100, 100), (group, r2, 50, 0, 0)]
        );
        Ok(())
    }

    #[test]
    fn resolver_emits_unmatched_member_placeholder() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("novel pathway");
        s.add_claim(group, 1, s.ns_hgnc, "NOSUCH1");
        s.add_claim(group, 2, s.ns_hgnc, "NOSUCH2");

        s.db.resolve_group_regions()?;

        assert_eq!(s.group_regions(), vec![(group, 0, 200, 200, 200)]);
        Ok(())
    }

    #[test]
    fn resolver_mixes_matches_and_placeholder() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("mixed");
        let region = s.add_region("BRCA2");
        s.add_region_name(region, s.ns_hgnc, "BRCA2");
        s.add_claim(group, 1, s.ns_hgnc, "BRCA2");
        s.add_claim(group, 2, s.ns_hgnc, "NOSUCH");

        s.db.resolve_group_regions()?;

        assert_eq!(
            s.group_regions(),
            vec![(group, 0, 100, 100, 100), (group, region, 100, 100, 100)]
        );
        Ok(())
    }

    #[test]
    fn resolver_without_claims_produces_nothing() -> Result<(), Error> {
        let s = Scaffold::new();
        s.add_group("empty");
        s.db.resolve_group_regions()?;
        assert_eq!(s.group_regions(), vec![]);
        Ok(())
    }

    #[test]
    fn resolver_is_total_reconstruction() -> Result<(), Error> {
        let s = Scaffold::new();
        let group = s.add_group("pathway");
        let region = s.add_region("BRCA1");
        s.add_region_name(region, s.ns_hgnc, "BRCA1");
        s.add_claim(group, 1, s.ns_hgnc, "BRCA1");

        s.db.resolve_group_regions()?;
        assert_eq!(s.group_regions().len(), 1);

        // dropping the staging rows empties the derived table on re-run
        s.db.connection()
            .execute("DELETE FROM group_region_name", [])?;
        s.db.resolve_group_regions()?;
        assert_eq!(s.group_regions(), vec![]);
        Ok(())
    }

    #[test]
    fn resolver_confidences_stay_in_range() -> Result<(), Error> {
        let s = Scaffold::new();
        // a few members with assorted fan-outs
        let group = s.add_group("assorted");
        for idx in 0..4 {
            let region = s.add_region(&format!("R{}", idx));
            s.add_region_name(region, s.ns_hgnc, &format!("name{}", idx % 2));
        }
        s.add_claim(group, 1, s.ns_hgnc, "name0");
        s.add_claim(group, 1, s.ns_hgnc, "name1");
        s.add_claim(group, 2, s.ns_hgnc, "name0");
        s.add_claim(group, 3, s.ns_hgnc, "missing");

        s.db.resolve_group_regions()?;

        for (_, region_id, specificity, implication, quality) in s.group_regions() {
            if region_id == 0 {
                continue;
            }
            for value in [specificity, implication, quality] {
                assert!((0..=100).contains(&value), "out of range: {}", value);
            }
        }
        Ok(())
    }
}
