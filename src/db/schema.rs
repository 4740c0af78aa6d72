//! Table and index definitions for the knowledge base store.
//!
//! Secondary indexes are declared separately from the table DDL so that the
//! bulk-update envelope can drop and recreate them by table name; primary
//! keys live in the table definitions and are never dropped.

/// A secondary index on one of the knowledge base tables.
pub struct IndexDef {
    /// Name of the index, used with `DROP INDEX`.
    pub name: &'static str,
    /// DDL recreating the index.
    pub create: &'static str,
}

/// A knowledge base table with its secondary indexes.
pub struct TableDef {
    /// Name of the table.
    pub name: &'static str,
    /// DDL creating the table.
    pub create: &'static str,
    /// Secondary indexes on the table.
    pub indexes: &'static [IndexDef],
}

/// All tables of the knowledge base, vocabulary first, then staging, then
/// derived.
pub const TABLES: &[TableDef] = &[
    // -- vocabulary ----------------------------------------------------
    TableDef {
        name: "namespace",
        create: "CREATE TABLE IF NOT EXISTS namespace (
            namespace_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            namespace TEXT UNIQUE NOT NULL,
            multigene TINYINT NOT NULL DEFAULT 0
        )",
        indexes: &[],
    },
    TableDef {
        name: "type",
        create: "CREATE TABLE IF NOT EXISTS type (
            type_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            type TEXT UNIQUE NOT NULL
        )",
        indexes: &[],
    },
    TableDef {
        name: "relationship",
        create: "CREATE TABLE IF NOT EXISTS relationship (
            relationship_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            relationship TEXT UNIQUE NOT NULL
        )",
        indexes: &[],
    },
    TableDef {
        name: "role",
        create: "CREATE TABLE IF NOT EXISTS role (
            role_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            role TEXT UNIQUE NOT NULL,
            description TEXT,
            coding TINYINT,
            exon TINYINT
        )",
        indexes: &[],
    },
    TableDef {
        name: "population",
        create: "CREATE TABLE IF NOT EXISTS population (
            population_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            population TEXT UNIQUE NOT NULL,
            ldcomment TEXT,
            description TEXT
        )",
        indexes: &[],
    },
    TableDef {
        name: "source",
        create: "CREATE TABLE IF NOT EXISTS source (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            source TEXT UNIQUE NOT NULL
        )",
        indexes: &[],
    },
    // -- staging -------------------------------------------------------
    TableDef {
        name: "group",
        create: "CREATE TABLE IF NOT EXISTS \"group\" (
            group_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            type_id INTEGER NOT NULL,
            label TEXT NOT NULL,
            description TEXT,
            source_id INTEGER NOT NULL
        )",
        indexes: &[IndexDef {
            name: "group__label",
            create: "CREATE INDEX IF NOT EXISTS group__label ON \"group\" (label)",
        }],
    },
    TableDef {
        name: "group_name",
        create: "CREATE TABLE IF NOT EXISTS group_name (
            group_id INTEGER NOT NULL,
            namespace_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (group_id, namespace_id, name)
        )",
        indexes: &[IndexDef {
            name: "group_name__name",
            create: "CREATE INDEX IF NOT EXISTS group_name__name \
                ON group_name (namespace_id, name)",
        }],
    },
    TableDef {
        name: "group_group",
        create: "CREATE TABLE IF NOT EXISTS group_group (
            group_id INTEGER NOT NULL,
            related_group_id INTEGER NOT NULL,
            relationship_id INTEGER NOT NULL,
            direction TINYINT NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (group_id, related_group_id, relationship_id, direction)
        )",
        indexes: &[IndexDef {
            name: "group_group__related",
            create: "CREATE INDEX IF NOT EXISTS group_group__related \
                ON group_group (related_group_id, group_id)",
        }],
    },
    TableDef {
        name: "group_region_name",
        create: "CREATE TABLE IF NOT EXISTS group_region_name (
            group_id INTEGER NOT NULL,
            member INTEGER NOT NULL,
            namespace_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (group_id, member, namespace_id, name)
        )",
        indexes: &[IndexDef {
            name: "group_region_name__name",
            create: "CREATE INDEX IF NOT EXISTS group_region_name__name \
                ON group_region_name (namespace_id, name)",
        }],
    },
    TableDef {
        name: "region",
        create: "CREATE TABLE IF NOT EXISTS region (
            region_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            type_id INTEGER NOT NULL,
            label TEXT NOT NULL,
            description TEXT,
            source_id INTEGER NOT NULL
        )",
        indexes: &[IndexDef {
            name: "region__label",
            create: "CREATE INDEX IF NOT EXISTS region__label ON region (label)",
        }],
    },
    TableDef {
        name: "region_name",
        create: "CREATE TABLE IF NOT EXISTS region_name (
            region_id INTEGER NOT NULL,
            namespace_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (region_id, namespace_id, name)
        )",
        indexes: &[IndexDef {
            name: "region_name__name",
            create: "CREATE INDEX IF NOT EXISTS region_name__name \
                ON region_name (namespace_id, name)",
        }],
    },
    TableDef {
        name: "region_bound",
        create: "CREATE TABLE IF NOT EXISTS region_bound (
            region_id INTEGER NOT NULL,
            population_id INTEGER NOT NULL,
            chr TINYINT NOT NULL,
            posMin BIGINT NOT NULL,
            posMax BIGINT NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (region_id, population_id, chr, posMin, posMax)
        )",
        indexes: &[IndexDef {
            name: "region_bound__chr",
            create: "CREATE INDEX IF NOT EXISTS region_bound__chr \
                ON region_bound (chr, posMin, posMax)",
        }],
    },
    TableDef {
        name: "snp",
        create: "CREATE TABLE IF NOT EXISTS snp (
            rs INTEGER NOT NULL,
            chr TINYINT NOT NULL,
            pos BIGINT NOT NULL,
            source_id INTEGER NOT NULL
        )",
        indexes: &[IndexDef {
            name: "snp__rs",
            create: "CREATE INDEX IF NOT EXISTS snp__rs ON snp (rs)",
        }],
    },
    TableDef {
        name: "snp_merge",
        create: "CREATE TABLE IF NOT EXISTS snp_merge (
            rsOld INTEGER NOT NULL,
            rsNew INTEGER NOT NULL,
            rsCur INTEGER NOT NULL,
            source_id INTEGER NOT NULL
        )",
        indexes: &[IndexDef {
            name: "snp_merge__old",
            create: "CREATE INDEX IF NOT EXISTS snp_merge__old ON snp_merge (rsOld)",
        }],
    },
    TableDef {
        name: "snp_role_entrez",
        create: "CREATE TABLE IF NOT EXISTS snp_role_entrez (
            rs INTEGER NOT NULL,
            region_entrez TEXT NOT NULL,
            role_id INTEGER NOT NULL,
            source_id INTEGER NOT NULL,
            PRIMARY KEY (rs, region_entrez, role_id)
        )",
        indexes: &[IndexDef {
            name: "snp_role_entrez__entrez",
            create: "CREATE INDEX IF NOT EXISTS snp_role_entrez__entrez \
                ON snp_role_entrez (region_entrez)",
        }],
    },
    // -- derived -------------------------------------------------------
    TableDef {
        name: "group_region",
        create: "CREATE TABLE IF NOT EXISTS group_region (
            group_id INTEGER NOT NULL,
            region_id INTEGER NOT NULL,
            specificity INTEGER NOT NULL,
            implication INTEGER NOT NULL,
            quality INTEGER NOT NULL,
            PRIMARY KEY (group_id, region_id)
        )",
        indexes: &[IndexDef {
            name: "group_region__region",
            create: "CREATE INDEX IF NOT EXISTS group_region__region \
                ON group_region (region_id, group_id)",
        }],
    },
    TableDef {
        name: "snp_role",
        create: "CREATE TABLE IF NOT EXISTS snp_role (
            rs INTEGER NOT NULL,
            region_id INTEGER NOT NULL,
            role_id INTEGER NOT NULL,
            PRIMARY KEY (rs, region_id, role_id)
        )",
        indexes: &[IndexDef {
            name: "snp_role__rs",
            create: "CREATE INDEX IF NOT EXISTS snp_role__rs ON snp_role (rs)",
        }],
    },
    TableDef {
        name: "region_zone",
        create: "CREATE TABLE IF NOT EXISTS region_zone (
            region_id INTEGER NOT NULL,
            population_id INTEGER NOT NULL,
            chr TINYINT NOT NULL,
            zone INTEGER NOT NULL,
            PRIMARY KEY (region_id, population_id, chr, zone)
        )",
        indexes: &[IndexDef {
            name: "region_zone__zone",
            create: "CREATE INDEX IF NOT EXISTS region_zone__zone \
                ON region_zone (chr, zone)",
        }],
    },
];

/// Look up a table definition by name.
pub fn table(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}
