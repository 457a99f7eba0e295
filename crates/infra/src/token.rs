//! # トークン生成
//!
//! 購読確認リンクと購読解除リンクに埋め込む推測不能なトークンを生成する。
//! 衝突確率は無視できるものとして、重複チェックは行わない。

use rand::RngCore;

/// トークンのバイト長（hex エンコード後は 64 文字）
pub const TOKEN_BYTES: usize = 32;

/// 暗号論的乱数から固定長のトークンを生成する
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トークンは64文字のhex() {
        let token = generate_token();

        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_トークンは呼び出しごとに異なる() {
        assert_ne!(generate_token(), generate_token());
    }
}
