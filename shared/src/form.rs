//! Multipart form decoding for `POST /furniture/detect`.

use std::convert::Infallible;

use futures::stream;

use crate::pipeline::DetectionRequest;
use crate::{Error, Result};

/// Decode the `image` and `disclaimer_accepted` fields of a detection upload.
pub async fn parse_detect_form(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<DetectionRequest> {
    let content_type =
        content_type.ok_or_else(|| Error::Validation("缺少 Content-Type".to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| Error::Validation("请求必须是 multipart/form-data".to_string()))?;

    let body = body.to_vec();
    let chunks = stream::once(async move { Ok::<_, Infallible>(body) });
    let mut multipart = multer::Multipart::new(chunks, boundary);

    let mut image = None;
    let mut file_name = None;
    let mut disclaimer = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                file_name = field.file_name().map(str::to_string);
                image = Some(field.bytes().await.map_err(invalid)?.to_vec());
            }
            Some("disclaimer_accepted") => {
                let raw = field.text().await.map_err(invalid)?;
                disclaimer = Some(parse_flag(&raw)?);
            }
            _ => {}
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| Error::Validation("缺少图片文件".to_string()))?;
    let disclaimer_accepted =
        disclaimer.ok_or_else(|| Error::Validation("缺少 disclaimer_accepted 字段".to_string()))?;

    Ok(DetectionRequest {
        image,
        file_name,
        disclaimer_accepted,
    })
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(Error::Validation(format!(
            "disclaimer_accepted 取值无效: {}",
            other
        ))),
    }
}

fn invalid(err: multer::Error) -> Error {
    Error::Validation(format!("表单解析失败: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARY: &str = "X-FURNITURE-BOUNDARY";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn form(image: Option<&[u8]>, disclaimer: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(flag) = disclaimer {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"disclaimer_accepted\"\r\n\r\n{}\r\n",
                    BOUNDARY, flag
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"chair.png\"\r\nContent-Type: image/png\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    #[tokio::test]
    async fn test_parses_fields() {
        let body = form(Some(&[1, 2, 3, 4]), Some("true"));
        let request = parse_detect_form(Some(&content_type()), &body).await.unwrap();
        assert_eq!(request.image, vec![1, 2, 3, 4]);
        assert_eq!(request.file_name.as_deref(), Some("chair.png"));
        assert!(request.disclaimer_accepted);
    }

    #[tokio::test]
    async fn test_disclaimer_false_is_parsed_not_rejected() {
        let body = form(Some(&[9]), Some("false"));
        let request = parse_detect_form(Some(&content_type()), &body).await.unwrap();
        assert!(!request.disclaimer_accepted);
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let err = parse_detect_form(Some(&content_type()), &form(None, Some("true")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("缺少图片文件"));

        let err = parse_detect_form(Some(&content_type()), &form(Some(&[1]), None))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disclaimer_accepted"));
    }

    #[tokio::test]
    async fn test_rejects_non_multipart() {
        let err = parse_detect_form(Some("application/json"), b"{}").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(parse_detect_form(None, b"").await.is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(" TRUE ").unwrap());
        assert!(!parse_flag("0").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
