//! 工具参数 Schema：由 schemars 从参数结构体生成 ToolParameter 列表
//!
//! 参数结构体同时用于 serde 反序列化，保证发给模型的 Schema 与实际解析规则一致。

use schemars::gen::SchemaSettings;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::llm::ToolArguments;
use crate::tools::{ToolError, ToolParameter};

/// 从参数结构体生成参数列表（属性按声明顺序）
pub fn parameters_of<T: JsonSchema>() -> Vec<ToolParameter> {
    let gen = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
        })
        .into_generator();
    let root = gen.into_root_schema_for::<T>();
    let Some(object) = root.schema.object else {
        return Vec::new();
    };
    object
        .properties
        .iter()
        .map(|(name, schema)| {
            let prop = effective_schema(schema);
            ToolParameter {
                name: name.clone(),
                param_type: prop.map(type_name).unwrap_or_else(|| "string".to_string()),
                description: describe(schema, prop),
                required: object.required.contains(name),
                enum_values: prop.and_then(|p| p.enum_values.clone()),
                items: prop.and_then(items_of),
            }
        })
        .collect()
}

/// 解析工具参数；失败为 InvalidArguments
pub fn parse_args<T: DeserializeOwned>(args: &ToolArguments) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Option<T> 可能生成 anyOf [T, null]，取其中非 null 的分支
fn effective_schema(schema: &Schema) -> Option<&SchemaObject> {
    let Schema::Object(obj) = schema else {
        return None;
    };
    if obj.instance_type.is_some() || obj.enum_values.is_some() {
        return Some(obj);
    }
    let any_of = obj.subschemas.as_ref().and_then(|s| s.any_of.as_ref())?;
    any_of.iter().find_map(|s| match s {
        Schema::Object(o) if !is_null(o) => Some(o),
        _ => None,
    })
}

fn is_null(obj: &SchemaObject) -> bool {
    matches!(
        &obj.instance_type,
        Some(SingleOrVec::Single(t)) if **t == InstanceType::Null
    )
}

fn type_name(obj: &SchemaObject) -> String {
    let ty = match &obj.instance_type {
        Some(SingleOrVec::Single(t)) => Some(**t),
        Some(SingleOrVec::Vec(ts)) => ts.iter().copied().find(|t| *t != InstanceType::Null),
        None => None,
    };
    let name = match ty {
        Some(InstanceType::Boolean) => "boolean",
        Some(InstanceType::Object) => "object",
        Some(InstanceType::Array) => "array",
        Some(InstanceType::Number) => "number",
        Some(InstanceType::Integer) => "integer",
        _ => "string",
    };
    name.to_string()
}

fn describe(outer: &Schema, inner: Option<&SchemaObject>) -> String {
    let from = |s: &SchemaObject| s.metadata.as_ref().and_then(|m| m.description.clone());
    let outer = match outer {
        Schema::Object(o) => from(o),
        Schema::Bool(_) => None,
    };
    outer.or_else(|| inner.and_then(from)).unwrap_or_default()
}

fn items_of(obj: &SchemaObject) -> Option<Value> {
    let items = obj.array.as_ref()?.items.as_ref()?;
    serde_json::to_value(items).ok()
}
