//! Data classes used to derive data assets from component labels

use crate::model::{tokenize, DataSensitivity};

#[derive(Debug, Clone, PartialEq)]
pub struct DataClass {
    pub name: &'static str,
    pub sensitivity: DataSensitivity,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
}

pub static DATA_CLASSES: &[DataClass] = &[
    DataClass {
        name: "user",
        sensitivity: DataSensitivity::Confidential,
        description: "User data such as credentials and profiles",
        keywords: &["credentials", "profile", "personal", "user", "account"],
    },
    DataClass {
        name: "business",
        sensitivity: DataSensitivity::Restricted,
        description: "Business records such as orders and payments",
        keywords: &[
            "transactions",
            "orders",
            "invoices",
            "payment",
            "business",
            "financial",
        ],
    },
    DataClass {
        name: "system",
        sensitivity: DataSensitivity::Internal,
        description: "Operational data such as logs, metrics and configuration",
        keywords: &["logs", "metrics", "config", "system", "monitoring", "performance"],
    },
    DataClass {
        name: "public",
        sensitivity: DataSensitivity::Public,
        description: "Publicly served content",
        keywords: &["content", "static", "media", "public", "website", "blog"],
    },
];

/// Data classes whose keywords appear as tokens of `label`, in table order.
pub fn classify_label(label: &str) -> Vec<&'static DataClass> {
    let tokens = tokenize(label);
    DATA_CLASSES
        .iter()
        .filter(|class| class.keywords.iter().any(|k| tokens.contains(*k)))
        .collect()
}
