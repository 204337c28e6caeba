//! Declarative table shapes for the local store.
//!
//! Each collection's columns are declared once here; the store consults these
//! tables to map records to rows and the migration manager uses them to build
//! or extend tables.

/// Storage type of a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Number,
    Boolean,
}

impl ColumnType {
    /// `SQLite` declared type for this column type
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::String => "TEXT",
            Self::Number => "REAL",
            Self::Boolean => "INTEGER",
        }
    }
}

/// A named, typed record field stored as one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: &'static str,
    pub kind: ColumnType,
    pub optional: bool,
}

impl ColumnSchema {
    pub const fn string(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::String,
            optional: false,
        }
    }

    pub const fn optional_string(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::String,
            optional: true,
        }
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Boolean,
            optional: false,
        }
    }

    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnType::Number,
            optional: false,
        }
    }

    /// Value given to existing rows when this column is added to them
    pub const fn default_sql(&self) -> &'static str {
        if self.optional {
            return "NULL";
        }
        match self.kind {
            ColumnType::String => "''",
            ColumnType::Number | ColumnType::Boolean => "0",
        }
    }

    /// Column definition for `CREATE TABLE` / `ALTER TABLE ADD COLUMN`
    pub fn definition(&self) -> String {
        if self.optional {
            format!("{} {}", self.name, self.kind.sql_type())
        } else {
            format!(
                "{} {} NOT NULL DEFAULT {}",
                self.name,
                self.kind.sql_type(),
                self.default_sql()
            )
        }
    }
}

/// Column holding the tombstone flag
pub const DELETED_COLUMN: &str = "is_deleted";
/// Column holding the stored dirty marker
pub const STATUS_COLUMN: &str = "_status";

/// Columns every record table carries, owned by the store rather than records
pub const SYSTEM_COLUMNS: &[(&str, &str)] = &[
    ("id", "TEXT PRIMARY KEY NOT NULL"),
    ("created_at", "INTEGER NOT NULL"),
    ("updated_at", "INTEGER NOT NULL"),
    (DELETED_COLUMN, "INTEGER NOT NULL DEFAULT 0"),
    (STATUS_COLUMN, "TEXT NOT NULL DEFAULT 'synced'"),
];

/// Shape of one collection's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSchema],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Whether `name` is a field column or one of the queryable timestamps
    pub fn is_queryable(&self, name: &str) -> bool {
        matches!(name, "id" | "created_at" | "updated_at") || self.column(name).is_some()
    }

    pub fn create_sql(&self) -> String {
        let definitions = SYSTEM_COLUMNS
            .iter()
            .map(|(name, definition)| format!("{name} {definition}"))
            .chain(self.columns.iter().map(ColumnSchema::definition))
            .collect::<Vec<_>>()
            .join(",\n            ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n            {definitions}\n        )",
            self.name
        )
    }

    pub fn index_sql(&self) -> [String; 3] {
        let table = self.name;
        [
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at DESC)"),
            format!("CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created_at DESC)"),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_dirty ON {table}({STATUS_COLUMN}, {DELETED_COLUMN})"
            ),
        ]
    }
}

/// Complete shape of the store at one schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSchema {
    pub version: u32,
    pub tables: &'static [TableSchema],
}

impl AppSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Schema version this build expects
pub const CURRENT_VERSION: u32 = 5;

/// The shape this build runs against
pub fn app_schema() -> &'static AppSchema {
    &APP_SCHEMA
}

/// The oldest shape the migration chain starts from
pub fn base_schema() -> &'static AppSchema {
    &BASE_SCHEMA
}

pub(crate) const USERS_BASE_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("role"),
    ColumnSchema::optional_string("department"),
    ColumnSchema::optional_string("designation"),
    ColumnSchema::optional_string("mpin"),
    ColumnSchema::boolean("is_mpin_set"),
];

pub(crate) const USERS_PROFILE_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::optional_string("father_name"),
    ColumnSchema::optional_string("dob"),
    ColumnSchema::optional_string("gender"),
    ColumnSchema::optional_string("whatsapp_number"),
    ColumnSchema::optional_string("alternate_mobile_number"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("bank_name"),
    ColumnSchema::optional_string("account_holder_name"),
    ColumnSchema::optional_string("account_number"),
    ColumnSchema::optional_string("upi_id"),
    ColumnSchema::optional_string("emergency_person_name"),
    ColumnSchema::optional_string("emergency_relation"),
    ColumnSchema::optional_string("emergency_contact_number"),
    ColumnSchema::optional_string("aadhaar_number"),
    ColumnSchema::optional_string("pan_number"),
    ColumnSchema::optional_string("driving_license_number"),
];

pub(crate) const USERS_PHOTO_COLUMNS: &[ColumnSchema] =
    &[ColumnSchema::optional_string("profile_photo")];

const USERS_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("role"),
    ColumnSchema::optional_string("department"),
    ColumnSchema::optional_string("designation"),
    ColumnSchema::optional_string("mpin"),
    ColumnSchema::boolean("is_mpin_set"),
    ColumnSchema::optional_string("father_name"),
    ColumnSchema::optional_string("dob"),
    ColumnSchema::optional_string("gender"),
    ColumnSchema::optional_string("whatsapp_number"),
    ColumnSchema::optional_string("alternate_mobile_number"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("bank_name"),
    ColumnSchema::optional_string("account_holder_name"),
    ColumnSchema::optional_string("account_number"),
    ColumnSchema::optional_string("upi_id"),
    ColumnSchema::optional_string("emergency_person_name"),
    ColumnSchema::optional_string("emergency_relation"),
    ColumnSchema::optional_string("emergency_contact_number"),
    ColumnSchema::optional_string("aadhaar_number"),
    ColumnSchema::optional_string("pan_number"),
    ColumnSchema::optional_string("driving_license_number"),
    ColumnSchema::optional_string("profile_photo"),
];

pub(crate) const CUSTOMERS_B2B_BASE_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("company_name"),
    ColumnSchema::optional_string("gstin"),
    ColumnSchema::optional_string("website"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("branch_type"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
];

const CUSTOMERS_B2B_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("company_name"),
    ColumnSchema::optional_string("gstin"),
    ColumnSchema::optional_string("website"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("branch_type"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
    ColumnSchema::optional_string("registered_by"),
    ColumnSchema::optional_string("team"),
];

pub(crate) const CUSTOMERS_B2C_BASE_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("father_name"),
    ColumnSchema::optional_string("dob"),
    ColumnSchema::optional_string("gender"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("whatsapp_number"),
    ColumnSchema::optional_string("alternate_mobile_number"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
    ColumnSchema::optional_string("city"),
];

const CUSTOMERS_B2C_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::string("name"),
    ColumnSchema::optional_string("father_name"),
    ColumnSchema::optional_string("dob"),
    ColumnSchema::optional_string("gender"),
    ColumnSchema::optional_string("email"),
    ColumnSchema::optional_string("phone"),
    ColumnSchema::optional_string("whatsapp_number"),
    ColumnSchema::optional_string("alternate_mobile_number"),
    ColumnSchema::optional_string("address_line"),
    ColumnSchema::optional_string("pincode"),
    ColumnSchema::optional_string("state"),
    ColumnSchema::optional_string("district"),
    ColumnSchema::optional_string("tehsil"),
    ColumnSchema::optional_string("village"),
    ColumnSchema::optional_string("city"),
    ColumnSchema::optional_string("registered_by"),
    ColumnSchema::optional_string("team"),
];

pub(crate) const CUSTOMER_ASSIGNMENT_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::optional_string("registered_by"),
    ColumnSchema::optional_string("team"),
];

const WORK_APPROVALS_COLUMNS: &[ColumnSchema] = &[
    ColumnSchema::optional_string("user_id"),
    ColumnSchema::string("date"),
    ColumnSchema::string("reason"),
    ColumnSchema::string("description"),
    ColumnSchema::string("status"),
];

static APP_SCHEMA: AppSchema = AppSchema {
    version: CURRENT_VERSION,
    tables: &[
        TableSchema {
            name: "users",
            columns: USERS_COLUMNS,
        },
        TableSchema {
            name: "customers_b2b",
            columns: CUSTOMERS_B2B_COLUMNS,
        },
        TableSchema {
            name: "customers_b2c",
            columns: CUSTOMERS_B2C_COLUMNS,
        },
        TableSchema {
            name: "work_approvals",
            columns: WORK_APPROVALS_COLUMNS,
        },
    ],
};

static BASE_SCHEMA: AppSchema = AppSchema {
    version: 1,
    tables: &[
        TableSchema {
            name: "users",
            columns: USERS_BASE_COLUMNS,
        },
        TableSchema {
            name: "work_approvals",
            columns: WORK_APPROVALS_COLUMNS,
        },
    ],
};
