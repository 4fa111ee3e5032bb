use thiserror::Error;

/// Boundary used for every outbound body. The endpoint only accepts this
/// literal, so no part may contain it.
pub const BOUNDARY: &str = "----------ThIs_Is_tHe_bouNdaRY_$";

const CRLF: &[u8] = b"\r\n";

/// A file part: raw bytes sent as `application/octet-stream`.
#[derive(Debug, Clone, Copy)]
pub struct FilePart<'a> {
    pub name: &'a str,
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// A part contained the boundary and would have split the body.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Multipart part '{part}' contains the body boundary")]
pub struct BoundaryCollision {
    pub part: String,
}

/// An encoded `multipart/form-data` body with its `Content-Type` header value.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Encode text fields followed by file parts, in the order given.
///
/// Each part starts with `--BOUNDARY`; lines end with CRLF; the body closes
/// with `--BOUNDARY--` and a trailing CRLF. File content is copied verbatim.
///
/// Fails if any name, value, file name or file content contains [`BOUNDARY`].
pub fn encode_multipart(
    fields: &[(&str, &str)],
    files: &[FilePart<'_>],
) -> Result<MultipartBody, BoundaryCollision> {
    for (name, value) in fields {
        if contains_boundary(name.as_bytes()) || contains_boundary(value.as_bytes()) {
            return Err(BoundaryCollision {
                part: name.to_string(),
            });
        }
    }
    for file in files {
        if contains_boundary(file.name.as_bytes())
            || contains_boundary(file.filename.as_bytes())
            || contains_boundary(file.data)
        {
            return Err(BoundaryCollision {
                part: file.name.to_string(),
            });
        }
    }

    let mut lines: Vec<Vec<u8>> = Vec::with_capacity(4 * (fields.len() + files.len()) + 2);

    for (name, value) in fields {
        lines.push(format!("--{BOUNDARY}").into_bytes());
        lines.push(format!("Content-Disposition: form-data; name=\"{name}\"").into_bytes());
        lines.push(Vec::new());
        lines.push(value.as_bytes().to_vec());
    }

    for file in files {
        lines.push(format!("--{BOUNDARY}").into_bytes());
        lines.push(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
                file.name, file.filename
            )
            .into_bytes(),
        );
        lines.push(b"Content-Type: application/octet-stream".to_vec());
        lines.push(Vec::new());
        lines.push(file.data.to_vec());
    }

    lines.push(format!("--{BOUNDARY}--").into_bytes());
    lines.push(Vec::new());

    Ok(MultipartBody {
        content_type: format!("multipart/form-data; boundary={BOUNDARY}"),
        body: lines.join(CRLF),
    })
}

fn contains_boundary(bytes: &[u8]) -> bool {
    bytes
        .windows(BOUNDARY.len())
        .any(|window| window == BOUNDARY.as_bytes())
}
