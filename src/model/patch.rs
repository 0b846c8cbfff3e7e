use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub value: Value,
}

/// Ordered JSON Patch document. Serializes as a bare array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDocument(Vec<PatchOperation>);

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push(PatchOp::Add, path.into(), value.into())
    }

    pub fn replace(&mut self, path: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.push(PatchOp::Replace, path.into(), value.into())
    }

    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.push(PatchOp::Remove, path.into(), Value::Null)
    }

    fn push(&mut self, op: PatchOp, path: String, value: Value) -> &mut Self {
        self.0.push(PatchOperation { op, path, value });
        self
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Find the operation targeting `path`, if any.
    pub fn find(&self, path: &str) -> Option<&PatchOperation> {
        self.0.iter().find(|o| o.path == path)
    }

    /// Apply the document to a JSON object, creating intermediate objects.
    ///
    /// Used for endpoints that take a plain object body instead of a patch.
    pub fn materialize(&self) -> Value {
        let mut root = serde_json::Map::new();
        for op in &self.0 {
            let segments: Vec<&str> = op.path.split('/').filter(|s| !s.is_empty()).collect();
            apply(&mut root, &segments, op);
        }
        Value::Object(root)
    }
}

fn apply(target: &mut serde_json::Map<String, Value>, segments: &[&str], op: &PatchOperation) {
    match segments {
        [] => {}
        [last] => match op.op {
            PatchOp::Add | PatchOp::Replace => {
                target.insert(last.to_string(), op.value.clone());
            }
            PatchOp::Remove => {
                target.remove(*last);
            }
        },
        [head, rest @ ..] => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(map) = child {
                apply(map, rest, op);
            }
        }
    }
}
