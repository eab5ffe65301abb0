//! 二进制字段在 JSON 线格式上的编码
//!
//! 字节字段统一以标准 base64 字符串表示，与客户端 SDK 保持一致。

/// `#[serde(with = "base64_bytes")]` 使用的编解码函数
pub mod base64_bytes {
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Wrapper {
        #[serde(with = "super::base64_bytes", default)]
        data: Vec<u8>,
    }

    #[test]
    fn test_bytes_are_base64_on_the_wire() {
        let json = serde_json::to_string(&Wrapper {
            data: b"hello".to_vec(),
        })
        .unwrap();
        assert_eq!(json, r#"{"data":"aGVsbG8="}"#);
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"data":"@@@"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_field_defaults_to_empty() {
        let wrapper: Wrapper = serde_json::from_str("{}").unwrap();
        assert!(wrapper.data.is_empty());
    }
}
