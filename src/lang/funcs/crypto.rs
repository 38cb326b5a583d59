use super::str_arg;
use base64::{engine::general_purpose, Engine as _};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use sha2::{Digest, Sha256, Sha512};

/// Cryptographic functions
pub fn create_md5_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = md5::compute(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", digest)))
        })
}

pub fn create_sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let result = Sha256::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", result)))
        })
}

pub fn create_sha512_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let result = Sha512::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(format!("{:x}", result)))
        })
}

pub fn create_base64sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let result = Sha256::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(general_purpose::STANDARD.encode(result)))
        })
}

pub fn create_base64sha512_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let result = Sha512::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(general_purpose::STANDARD.encode(result)))
        })
}

/// Random v4 UUID. Impure.
pub fn create_uuid_func() -> FuncDef {
    FuncDef::builder().build(|_: FuncArgs| Ok(Value::from(uuid::Uuid::new_v4().to_string())))
}

#[cfg(test)]
mod tests {
    use super::super::{eval, FunctionTable};
    use crate::value::Value;

    fn call(src: &str) -> Value {
        eval(&FunctionTable::new(), src).unwrap()
    }

    #[test]
    fn test_md5_function() {
        assert_eq!(call(r#"md5("hello world")"#), Value::from("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert_eq!(call(r#"md5("")"#), Value::from("d41d8cd98f00b204e9800998ecf8427e"));
    }

    #[test]
    fn test_sha_functions() {
        assert_eq!(
            call(r#"sha256("hello world")"#),
            Value::from("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        assert_eq!(
            call(r#"base64sha256("hello world")"#),
            Value::from("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=")
        );
        assert_eq!(
            call(r#"sha512("")"#),
            Value::from(
                "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
            )
        );
    }

    #[test]
    fn test_uuid_function() {
        let Value::String(id) = call("uuid()") else {
            panic!("uuid must return a string");
        };
        assert_eq!(id.len(), 36);
    }
}
