use std::collections::HashMap;
use std::sync::LazyLock;

use super::normalize::normalize_order_name;

/// Rank given to names that match no category. Sorts after every category.
pub const UNRANKED: usize = usize::MAX;

/// Preferred order of the consolidated PDF, paired with the spellings the
/// workbooks are known to use for each category.
pub const DEFAULT_CONSOLIDATED_ORDER: &[(&str, &[&str])] = &[
    ("SALDOS COBRANZA", &[]),
    ("MANUEL CARRASCO", &[]),
    ("PITER HUAYTA", &[]),
    ("LEONEL MEZA", &[]),
    (
        "CANETE",
        &[
            "CANETE - (MANUEL)",
            "CANETE (MANUEL)",
            "CAÑETE",
            "CAÑETE - (MANUEL)",
            "CAÑETE (MANUEL)",
        ],
    ),
    ("BEATRIZ ROJAS", &[]),
    ("LURIN", &["LURIN - (ROSA)"]),
    ("MANCHAY", &["MANCHAY - (ROSA)"]),
    ("CIUDAD", &["CIUDAD - (ROSA)"]),
    ("UNICACHI", &["UNICACHI SUR - (ROSA)", "UNICACHI SUR (ROSA)"]),
    ("NORTE - ROSA", &["NORTE ROSA", "NORTE-ROSA"]),
    ("CAQUETA (ROSA)", &["CAQUETA - (ROSA)", "CAQUETA ROSA"]),
    ("SURCO (OSCAR)", &["SURCO - (OSCAR)", "SURCO OSCAR"]),
    (
        "SURQUILLO (OSCAR)",
        &["SURQ/SURCO - (OSCAR)", "SURQ/SURCO (OSCAR)"],
    ),
    ("SAN LUIS (OSCAR)", &["SAN LUIS - (OSCAR)", "SAN LUIS OSCAR"]),
    ("RAUL ARROYO", &[]),
];

static DEFAULT_ORDER: LazyLock<CanonicalOrder> =
    LazyLock::new(|| CanonicalOrder::new(DEFAULT_CONSOLIDATED_ORDER));

/// Lookup from normalized category spelling to its position in the order.
#[derive(Debug, Clone)]
pub struct CanonicalOrder {
    ranks: HashMap<String, usize>,
}

impl CanonicalOrder {
    /// Builds the lookup. Each canonical name is registered as its own alias.
    pub fn new(entries: &[(&str, &[&str])]) -> Self {
        let mut ranks = HashMap::new();
        for (position, (name, aliases)) in entries.iter().enumerate() {
            ranks.insert(normalize_order_name(name), position);
            for alias in aliases.iter() {
                ranks.insert(normalize_order_name(alias), position);
            }
        }
        Self { ranks }
    }

    /// The built-in consolidated order.
    pub fn default_order() -> &'static CanonicalOrder {
        &DEFAULT_ORDER
    }

    pub fn rank(&self, name: &str) -> usize {
        self.ranks
            .get(&normalize_order_name(name))
            .copied()
            .unwrap_or(UNRANKED)
    }
}
