use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FetchError, GoogleApiClient};

/// Maximum number of files returned by a listing.
pub const DRIVE_PAGE_SIZE: usize = 10;

/// A Drive file as returned to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

impl GoogleApiClient {
    /// First page of non-trashed files, in whatever order Drive picks.
    pub async fn list_drive_files(&self, access_token: &str) -> Result<Vec<DriveFile>, FetchError> {
        let page_size = DRIVE_PAGE_SIZE.to_string();
        let list: FileList = self
            .get_json(
                "/drive/v3/files",
                access_token,
                &[
                    ("q", "trashed=false"),
                    ("fields", "files(id, name, mimeType, webViewLink)"),
                    ("pageSize", page_size.as_str()),
                ],
            )
            .await?;

        let mut files = list.files;
        files.truncate(DRIVE_PAGE_SIZE);
        debug!("fetched {} drive files", files.len());
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uses_drive_field_names() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"f1","name":"Notes","mimeType":"text/plain","webViewLink":"https://drive.google.com/f1"}"#,
        )
        .unwrap();
        assert_eq!(file.mime_type, "text/plain");

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["webViewLink"], "https://drive.google.com/f1");
        assert_eq!(json["mimeType"], "text/plain");
    }

    #[test]
    fn missing_view_link_is_omitted() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id":"f2","name":"Folder","mimeType":"application/vnd.google-apps.folder"}"#)
                .unwrap();
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("webViewLink").is_none());
    }
}
