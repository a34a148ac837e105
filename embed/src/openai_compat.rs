use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// OpenAI-compatible embedding request body.
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
    encoding_format: &'a str,
}

/// OpenAI-compatible embedding response.
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

/// Call an OpenAI-compatible `/embeddings` endpoint for one batch.
pub(crate) async fn call_embedding_api(
    client: &Client,
    api_key: &str,
    base_url: &str,
    model: &str,
    dimensions: usize,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
    let body = EmbeddingRequest {
        model,
        input: texts,
        dimensions,
        encoding_format: "float",
    };

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| EmbedError::Transport(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(EmbedError::Http { status, body });
    }

    let data: EmbeddingResponse = resp
        .json()
        .await
        .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

    collect_by_index(data.data, texts.len())
}

/// Fill results by index; the API may return items out of order.
fn collect_by_index(items: Vec<EmbeddingData>, len: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vecs: Vec<Option<Vec<f32>>> = vec![None; len];
    for item in items {
        if item.index >= len {
            return Err(EmbedError::UnexpectedIndex {
                index: item.index,
                batch_size: len,
            });
        }
        vecs[item.index] = Some(item.embedding.iter().map(|&v| v as f32).collect());
    }

    vecs.into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or(EmbedError::MissingIndex(i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize, v: f64) -> EmbeddingData {
        EmbeddingData {
            index,
            embedding: vec![v, v],
        }
    }

    #[test]
    fn test_out_of_order_items_are_reordered() {
        let vecs = collect_by_index(vec![item(1, 2.0), item(0, 1.0)], 2).unwrap();
        assert_eq!(vecs[0], vec![1.0, 1.0]);
        assert_eq!(vecs[1], vec![2.0, 2.0]);
    }

    #[test]
    fn test_missing_item() {
        let err = collect_by_index(vec![item(0, 1.0)], 2).unwrap_err();
        assert!(matches!(err, EmbedError::MissingIndex(1)));
    }

    #[test]
    fn test_unexpected_index() {
        let err = collect_by_index(vec![item(5, 1.0)], 2).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::UnexpectedIndex { index: 5, batch_size: 2 }
        ));
    }
}
