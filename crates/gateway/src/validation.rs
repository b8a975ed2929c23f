//! # 入力検証
//!
//! アップロード者情報のサニタイズ、ファイル名の安全化、拡張子の許可リスト判定、
//! 相対パスポリシー、保存先オブジェクト名の構築。

use std::str::FromStr;

use icu_normalizer::DecomposingNormalizerBorrowed;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GatewayError;

/// アップロードを許可する拡張子（小文字）。
pub const ALLOWED_EXTENSIONS: [&str; 6] = ["pdf", "jpg", "jpeg", "png", "xlsx", "csv"];

/// name / email に許可する文字集合。
static IDENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_.@ ]+$").unwrap());

/// name / email を検証し、前後の空白を除去した値を返す。
///
/// 許可文字以外を含む場合、欠落している場合、空白除去後に空になる場合は
/// すべて `InvalidInput` とする。
pub fn sanitize_identity(value: Option<&str>) -> Result<String, GatewayError> {
    let value = value.ok_or_else(GatewayError::invalid_input)?;
    if !IDENTITY_RE.is_match(value) {
        return Err(GatewayError::invalid_input());
    }
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::invalid_input());
    }
    Ok(trimmed.to_string())
}

/// クライアント申告のファイル名をファイルシステム上安全な形に落とす。
///
/// ディレクトリ成分を取り除き、NFKD分解後に非ASCII文字を捨て、空白の連続を `_` にまとめ、
/// `[A-Za-z0-9_.-]` 以外を削除し、前後の `.` と `_` を落とす。
pub fn secure_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let ascii: String = DecomposingNormalizerBorrowed::new_nfkd()
        .normalize(base)
        .chars()
        .filter(char::is_ascii)
        .collect();
    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// 最後の `.` 以降の拡張子が許可リストに含まれるか（大文字小文字を区別しない）。
pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// 相対パスの扱い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativePathPolicy {
    /// 空パス、先頭 `/`、`\`、`.` / `..` セグメントを拒否する
    #[default]
    RejectTraversal,
    /// クライアントの値をそのまま使う
    Verbatim,
}

impl RelativePathPolicy {
    /// 保存先の名前成分を検査する。
    ///
    /// 許可文字集合は `.` を含むため、名前が `.` / `..` だと
    /// プレフィックス直下の別ディレクトリを指してしまう。
    pub fn check_uploader(self, name: &str) -> Result<(), GatewayError> {
        match self {
            RelativePathPolicy::Verbatim => Ok(()),
            RelativePathPolicy::RejectTraversal if name == "." || name == ".." => {
                Err(GatewayError::invalid_input())
            }
            RelativePathPolicy::RejectTraversal => Ok(()),
        }
    }

    /// ポリシーに従って相対パスを検査する。
    pub fn check(self, relative_path: &str) -> Result<(), GatewayError> {
        match self {
            RelativePathPolicy::Verbatim => Ok(()),
            RelativePathPolicy::RejectTraversal => {
                let escapes = relative_path.is_empty()
                    || relative_path.starts_with('/')
                    || relative_path.contains('\\')
                    || relative_path
                        .split('/')
                        .any(|segment| segment == ".." || segment == ".");
                if escapes {
                    return Err(GatewayError::InvalidInput(format!(
                        "Invalid relative path: {relative_path}"
                    )));
                }
                Ok(())
            }
        }
    }
}

impl FromStr for RelativePathPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject-traversal" => Ok(RelativePathPolicy::RejectTraversal),
            "verbatim" => Ok(RelativePathPolicy::Verbatim),
            other => Err(format!(
                "不明なポリシー: {other}（reject-traversal / verbatim）"
            )),
        }
    }
}

/// 保存先オブジェクト名 `<prefix>/<name>/<relative_path>` を構築する。
pub fn object_name(prefix: &str, name: &str, relative_path: &str) -> String {
    format!("{}/{}/{}", prefix.trim_end_matches('/'), name, relative_path)
}
