//! 加密协作方
//!
//! 仅在任务 payload 被标记为敏感时调用；真实 KMS/信封加密由调用方注入，
//! 这里提供透传与按字节掩码两个占位实现。

/// 加密 trait：对序列化后的 payload 做不透明变换
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plain: &[u8]) -> Vec<u8>;
}

/// 透传实现：未配置加密后端时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncryptor;

impl Encryptor for NoopEncryptor {
    fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        plain.to_vec()
    }
}

/// 按字节循环异或的掩码实现（仅作演示，不提供真实机密性）
#[derive(Debug, Clone)]
pub struct XorEncryptor {
    key: Vec<u8>,
}

impl XorEncryptor {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        Self {
            key: if key.is_empty() { vec![0xA5] } else { key },
        }
    }
}

impl Encryptor for XorEncryptor {
    fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        plain
            .iter()
            .enumerate()
            .map(|(i, b)| b ^ self.key[i % self.key.len()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_passthrough() {
        assert_eq!(NoopEncryptor.encrypt(b"payload"), b"payload".to_vec());
    }

    #[test]
    fn test_xor_changes_bytes_and_is_involutive() {
        let enc = XorEncryptor::new(b"key".to_vec());
        let cipher = enc.encrypt(b"secret");
        assert_ne!(cipher, b"secret".to_vec());
        assert_eq!(enc.encrypt(&cipher), b"secret".to_vec());
    }
}
