use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::utils::serde_helpers::{first_field, first_u64};

/// 标准API响应格式 `{success, message?, data?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn empty() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
        }
    }

    pub fn failure(message: Option<String>) -> Self {
        Self {
            success: false,
            message,
            data: None,
        }
    }

    /// success:false 转换为 `ServerRejected`，否则取出 data
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(AppError::rejected(self.message))
        }
    }
}

/// 从错误响应体中提取服务端消息
///
/// 兼容 `{message}`、`{error: "..."}` 与 `{error: {message}}` 三种写法。
pub fn extract_error_message(body: &Value) -> Option<String> {
    if let Some(msg) = body.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }

    match body.get("error") {
        Some(Value::String(msg)) => Some(msg.clone()),
        Some(obj @ Value::Object(_)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// 规范化后的分页信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PageInfo {
    pub fn new(page: u32, page_size: u32, total_items: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            saturate_u32(total_items.div_ceil(page_size as u64))
        };

        Self {
            page: page.max(1),
            page_size,
            total_items,
            total_pages,
        }
    }

    /// 读取后端返回的任意一种分页字段命名
    ///
    /// 缺失的字段用请求参数或条目数补齐。
    pub fn normalize(source: &Value, requested_page: u32, requested_size: u32, item_count: usize) -> Self {
        let page = first_u64(source, &["page", "currentPage", "current_page", "pageNumber"])
            .map(saturate_u32)
            .unwrap_or(requested_page);
        let page_size = first_u64(source, &["limit", "pageSize", "page_size", "perPage", "per_page"])
            .map(saturate_u32)
            .unwrap_or(requested_size);
        let total_items = first_u64(
            source,
            &["total", "totalItems", "total_items", "totalCount", "count"],
        )
        .unwrap_or(item_count as u64);

        let mut info = PageInfo::new(page, page_size, total_items);
        if let Some(pages) = first_u64(source, &["totalPages", "total_pages", "pages", "pageCount"]) {
            info.total_pages = saturate_u32(pages);
        }
        info
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

fn saturate_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// 一页数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub info: PageInfo,
}

impl<T: DeserializeOwned> Page<T> {
    /// 每种资源一个规范化入口：`item_keys` 为该资源列表可能出现的字段名
    ///
    /// `data` 可以直接是数组，也可以是包含列表与分页字段的对象，
    /// 分页字段还可能嵌套在 `pagination` / `meta` 下。
    pub fn from_data(
        data: Value,
        item_keys: &[&str],
        requested_page: u32,
        requested_size: u32,
    ) -> Result<Self> {
        let (raw_items, meta) = match data {
            Value::Array(items) => (items, Value::Null),
            Value::Object(_) => {
                let items = first_field(&data, item_keys)
                    .or_else(|| first_field(&data, &["items", "results", "rows"]))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let meta = first_field(&data, &["pagination", "meta", "pageInfo"])
                    .cloned()
                    .unwrap_or(data);
                (items, meta)
            }
            Value::Null => (Vec::new(), Value::Null),
            other => {
                return Err(AppError::Internal(format!(
                    "Unexpected list payload: {}",
                    other
                )))
            }
        };

        let items = raw_items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        let info = PageInfo::normalize(&meta, requested_page, requested_size, items.len());

        Ok(Self { items, info })
    }
}
