use super::{arg, str_arg};
use base64::{engine::general_purpose, Engine as _};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

/// Base64 encoding/decoding functions
pub fn create_base64encode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let encoded = general_purpose::STANDARD.encode(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(encoded))
        })
}

pub fn create_base64decode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let bytes = general_purpose::STANDARD
                .decode(str_arg(&args, 0)?)
                .map_err(|_| "failed to decode base64 data".to_string())?;
            String::from_utf8(bytes)
                .map(Value::from)
                .map_err(|_| "the result of decoding the provided string is not valid UTF-8".to_string())
        })
}

pub fn create_jsonencode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            serde_json::to_string(arg(&args, 0)?)
                .map(Value::from)
                .map_err(|e| e.to_string())
        })
}

pub fn create_jsondecode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| serde_json::from_str::<Value>(str_arg(&args, 0)?).map_err(|e| e.to_string()))
}
