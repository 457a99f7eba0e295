/// UUID v7 の ID newtype を定義する
///
/// 生成される API は `new()`（v7 を採番）、`from_uuid()`、`as_uuid()`、
/// `Display`（ハイフン付き小文字）、serde（UUID 文字列）、`Default`（= `new()`）。
/// v7 は時刻順に並ぶため、配信ログなどを ID 順に読むと作成順になる。
///
/// ```rust
/// use recipebox_domain::delivery_log::DeliveryLogId;
///
/// let id = DeliveryLogId::new();
/// assert_eq!(DeliveryLogId::from_uuid(*id.as_uuid()), id);
/// assert_eq!(id.as_uuid().get_version_num(), 7);
/// ```
macro_rules! define_uuid_id {
    ($(#[$attr:meta])* $vis:vis struct $id:ident;) => {
        $(#[$attr])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        $vis struct $id(uuid::Uuid);

        impl $id {
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $id {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
