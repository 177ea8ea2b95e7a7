use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

/// Driver-independent type family of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PortableType {
    Integer,
    Float,
    String,
    Binary,
    DateTime,
    /// A type the map does not know; values are handled as text.
    OpaqueString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub portable: PortableType,
    /// Exact numeric storage (`decimal`, `money`).
    pub exact: bool,
    /// `text`, `ntext`, `image`, `xml` and the `(max)` types.
    pub large_object: bool,
}

impl TypeInfo {
    const fn of(portable: PortableType) -> Self {
        Self {
            portable,
            exact: false,
            large_object: false,
        }
    }

    const fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    const fn large(mut self) -> Self {
        self.large_object = true;
        self
    }
}

static STANDARD: LazyLock<TypeMap> = LazyLock::new(TypeMap::standard);

/// Lookup from SQL Server type names to [`TypeInfo`]. Total: unknown names
/// map to [`PortableType::OpaqueString`].
///
/// ```rust
/// use sqlsrv_core::schema::{PortableType, TypeMap};
///
/// let map = TypeMap::global();
/// assert_eq!(map.lookup("INT IDENTITY").portable, PortableType::Integer);
/// assert!(map.lookup("decimal()").exact);
/// assert_eq!(map.lookup("hierarchyid").portable, PortableType::OpaqueString);
/// ```
#[derive(Debug, Clone)]
pub struct TypeMap {
    entries: HashMap<&'static str, TypeInfo>,
}

impl TypeMap {
    /// The process-wide map, built on first use.
    #[must_use]
    pub fn global() -> &'static TypeMap {
        &STANDARD
    }

    #[must_use]
    pub fn standard() -> Self {
        use PortableType::{Binary, DateTime, Float, Integer, String};

        let entries = [
            ("bigint", TypeInfo::of(Integer)),
            ("int", TypeInfo::of(Integer)),
            ("smallint", TypeInfo::of(Integer)),
            ("tinyint", TypeInfo::of(Integer)),
            ("bit", TypeInfo::of(Integer)),
            ("decimal", TypeInfo::of(Float).exact()),
            ("numeric", TypeInfo::of(Float).exact()),
            ("money", TypeInfo::of(Float).exact()),
            ("smallmoney", TypeInfo::of(Float).exact()),
            ("float", TypeInfo::of(Float)),
            ("real", TypeInfo::of(Float)),
            ("char", TypeInfo::of(String)),
            ("nchar", TypeInfo::of(String)),
            ("varchar", TypeInfo::of(String)),
            ("nvarchar", TypeInfo::of(String)),
            ("sysname", TypeInfo::of(String)),
            ("uniqueidentifier", TypeInfo::of(String)),
            ("sql_variant", TypeInfo::of(String)),
            ("varchar(max)", TypeInfo::of(String).large()),
            ("nvarchar(max)", TypeInfo::of(String).large()),
            ("text", TypeInfo::of(String).large()),
            ("ntext", TypeInfo::of(String).large()),
            ("xml", TypeInfo::of(String).large()),
            ("binary", TypeInfo::of(Binary)),
            ("varbinary", TypeInfo::of(Binary)),
            ("timestamp", TypeInfo::of(Binary)),
            ("rowversion", TypeInfo::of(Binary)),
            ("geography", TypeInfo::of(Binary)),
            ("geometry", TypeInfo::of(Binary)),
            ("udt", TypeInfo::of(Binary)),
            ("varbinary(max)", TypeInfo::of(Binary).large()),
            ("image", TypeInfo::of(Binary).large()),
            ("date", TypeInfo::of(DateTime)),
            ("time", TypeInfo::of(DateTime)),
            ("datetime", TypeInfo::of(DateTime)),
            ("datetime2", TypeInfo::of(DateTime)),
            ("smalldatetime", TypeInfo::of(DateTime)),
            ("datetimeoffset", TypeInfo::of(DateTime)),
        ];
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Lower-case, drop ` identity` and empty `()`.
    #[must_use]
    pub fn normalize(type_name: &str) -> String {
        type_name
            .to_ascii_lowercase()
            .replace(" identity", "")
            .replace("()", "")
            .trim()
            .to_string()
    }

    #[must_use]
    pub fn lookup(&self, type_name: &str) -> TypeInfo {
        self.entries
            .get(Self::normalize(type_name).as_str())
            .copied()
            .unwrap_or(TypeInfo::of(PortableType::OpaqueString))
    }

    /// Whether the raw catalog name marks an identity column.
    #[must_use]
    pub fn is_identity(type_name: &str) -> bool {
        type_name.to_ascii_lowercase().contains(" identity")
    }
}
