use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two classification hierarchies of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureGroup {
    Areas,
    Iterations,
}

impl StructureGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureGroup::Areas => "Areas",
            StructureGroup::Iterations => "Iterations",
        }
    }
}

impl fmt::Display for StructureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "area" | "areas" => Ok(StructureGroup::Areas),
            "iteration" | "iterations" => Ok(StructureGroup::Iterations),
            other => Err(format!("unknown structure group '{other}' (expected areas or iterations)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationNode {
    pub id: i64,
    #[serde(default)]
    pub identifier: Option<String>,
    pub name: String,
    #[serde(default)]
    pub structure_type: Option<String>,
    #[serde(default)]
    pub has_children: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<NodeAttributes>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ClassificationNode>,
}

/// Requested changes to a classification node; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub finish_date: Option<DateTime<Utc>>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.start_date.is_none() && self.finish_date.is_none()
    }
}
