use super::str_arg;
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use path_absolutize::Absolutize;
use std::path::Path;

/// Filesystem path functions. These only manipulate path strings; nothing
/// is read from disk.
pub fn create_basename_func() -> FuncDef {
    FuncDef::builder().param(ParamType::String).build(|args: FuncArgs| {
        let path = str_arg(&args, 0)?.trim_end_matches('/');
        Ok(Value::from(match path.rsplit_once('/') {
            Some((_, base)) => base,
            None if path.is_empty() => ".",
            None => path,
        }))
    })
}

pub fn create_dirname_func() -> FuncDef {
    FuncDef::builder().param(ParamType::String).build(|args: FuncArgs| {
        let path = str_arg(&args, 0)?;
        Ok(Value::from(match path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((dir, _)) => dir,
            None => ".",
        }))
    })
}

pub fn create_abspath_func() -> FuncDef {
    FuncDef::builder().param(ParamType::String).build(|args: FuncArgs| {
        let path = Path::new(str_arg(&args, 0)?);
        let abs = path.absolutize().map_err(|e| e.to_string())?;
        Ok(Value::from(abs.to_string_lossy().replace('\\', "/")))
    })
}

/// Expands a leading `~` to the home directory.
pub fn create_pathexpand_func() -> FuncDef {
    FuncDef::builder().param(ParamType::String).build(|args: FuncArgs| {
        let path = str_arg(&args, 0)?;
        let Some(rest) = path.strip_prefix('~') else {
            return Ok(Value::from(path));
        };
        if !(rest.is_empty() || rest.starts_with('/')) {
            return Ok(Value::from(path));
        }
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| "cannot determine the home directory".to_string())?;
        Ok(Value::from(format!("{home}{rest}")))
    })
}
