/// 后端不同接口返回的字段格式不统一，这里集中处理反序列化

use serde::{Deserialize, Deserializer, Serializer};

/// 处理字符串或数字形式的 ID (例如: "42" 或 42)
pub mod flexible_id {
    use super::*;

    pub fn serialize<S>(id: &str, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(id)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum IdValue {
            String(String),
            Number(serde_json::Number),
        }

        match IdValue::deserialize(deserializer)? {
            IdValue::String(s) => Ok(s),
            IdValue::Number(n) => Ok(n.to_string()),
        }
    }
}

/// 从 JSON 对象中按候选字段名依次读取第一个存在的值
pub fn first_field<'a>(
    value: &'a serde_json::Value,
    names: &[&str],
) -> Option<&'a serde_json::Value> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .find(|v| !v.is_null())
}

/// 读取非负整数，兼容 "3" 这类字符串数字
pub fn first_u64(value: &serde_json::Value, names: &[&str]) -> Option<u64> {
    first_field(value, names).and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
