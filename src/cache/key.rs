//! 缓存键：操作名 + 归一化输入 + 影响输出的配置字段的 sha256
//!
//! user_id / organization_id / metadata 不参与，缓存是结果级而非用户级。

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::TaskConfig;

/// 计算缓存键，格式 `{operation}:{hex}`
pub fn cache_key(operation: &str, inputs: &Value, config: &TaskConfig) -> String {
    let material = json!({
        "inputs": normalize(inputs),
        "model": config.model,
        "temperature": config.temperature,
        "maxTokens": config.max_tokens,
    });
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update([0u8]);
    hasher.update(material.to_string().as_bytes());
    format!("{}:{}", operation, hex(&hasher.finalize()))
}

/// 字符串去首尾空白并折叠连续空白；对象键本身由 serde_json 的 Map 排序
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ")),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
