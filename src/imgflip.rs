//! ImgFlip renderer
//!
//! Captions are posted to `caption_image` as a form: `text0`/`text1` for
//! templates with up to two slots, `boxes[i][text]` otherwise.

use crate::config::ImgFlipConfig;
use crate::error::{Error, Result};
use crate::pipeline::ImageRenderer;
use crate::types::TemplateRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Renders memes through the ImgFlip API
pub struct ImgFlipRenderer {
    client: Client,
    config: ImgFlipConfig,
    no_watermark: bool,
}

impl ImgFlipRenderer {
    /// Create a renderer from `IMG_FLIP_API_USERNAME` / `IMG_FLIP_API_PASSWORD`
    pub fn from_env() -> Result<Self> {
        Self::new(ImgFlipConfig::from_env()?)
    }

    /// Create a renderer with the given configuration
    pub fn new(config: ImgFlipConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            config,
            no_watermark: false,
        })
    }

    /// Ask for images without the ImgFlip watermark (premium accounts)
    pub fn with_no_watermark(mut self, no_watermark: bool) -> Self {
        self.no_watermark = no_watermark;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.as_str().trim_end_matches('/'), path)
    }

    fn caption_form(&self, template: &TemplateRecord, captions: &[String]) -> Vec<(String, String)> {
        let mut form = vec![
            ("template_id".to_string(), template.id.clone()),
            ("username".to_string(), self.config.username.clone()),
            ("password".to_string(), self.config.password().to_string()),
            ("font".to_string(), self.config.font.clone()),
            ("max_font_size".to_string(), self.config.max_font_size.to_string()),
        ];

        if captions.len() <= 2 {
            for (i, caption) in captions.iter().enumerate() {
                form.push((format!("text{}", i), caption.clone()));
            }
        } else {
            for (i, caption) in captions.iter().enumerate() {
                form.push((format!("boxes[{}][text]", i), caption.clone()));
            }
        }

        if self.no_watermark {
            form.push(("no_watermark".to_string(), "1".to_string()));
        }
        form
    }

    /// The 100 most captioned templates, as bare template records
    pub async fn popular_templates(&self) -> Result<Vec<TemplateRecord>> {
        let response = self.client.get(self.endpoint("get_memes")).send().await?;
        let body: ApiResponse<MemesData> = response.error_for_status()?.json().await?;
        let data = body.into_result("get_memes")?;

        Ok(data
            .memes
            .into_iter()
            .map(|meme| {
                let mut template = TemplateRecord::new(meme.id, meme.name, meme.box_count);
                template.image_url = Some(meme.url);
                template
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error_message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, template: &str) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(Error::render(template, "response has no data")),
            (false, _) => Err(Error::render(
                template,
                self.error_message.unwrap_or_else(|| "unknown error".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CaptionData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MemesData {
    memes: Vec<MemeEntry>,
}

#[derive(Debug, Deserialize)]
struct MemeEntry {
    id: String,
    name: String,
    url: String,
    box_count: usize,
}

#[async_trait]
impl ImageRenderer for ImgFlipRenderer {
    async fn render(&self, template: &TemplateRecord, captions: &[String]) -> Result<String> {
        if captions.len() != template.box_count {
            return Err(Error::validation(format!(
                "template `{}` takes {} captions, got {}",
                template.id,
                template.box_count,
                captions.len()
            )));
        }

        let response = self
            .client
            .post(self.endpoint("caption_image"))
            .form(&self.caption_form(template, captions))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::render(&template.id, format!("ImgFlip returned status {}", status)));
        }

        let body: ApiResponse<CaptionData> = response.json().await?;
        let url = body.into_result(&template.id)?.url;
        debug!(template = %template.id, %url, "meme rendered");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use url::Url;

    fn renderer(server: &mockito::Server) -> ImgFlipRenderer {
        let config = ImgFlipConfig::new("meme-bot", "hunter2")
            .unwrap()
            .with_base_url(Url::parse(&server.url()).unwrap());
        ImgFlipRenderer::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_two_slot_template_uses_text_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/caption_image")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("template_id".into(), "181913649".into()),
                Matcher::UrlEncoded("username".into(), "meme-bot".into()),
                Matcher::UrlEncoded("password".into(), "hunter2".into()),
                Matcher::UrlEncoded("font".into(), "impact".into()),
                Matcher::UrlEncoded("max_font_size".into(), "50".into()),
                Matcher::UrlEncoded("text0".into(), "Reading the study".into()),
                Matcher::UrlEncoded("text1".into(), "Reading the headline".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"url":"https://i.imgflip.com/8abc.jpg","page_url":"https://imgflip.com/i/8abc"}}"#)
            .create_async()
            .await;

        let template = TemplateRecord::new("181913649", "Drake Hotline Bling", 2);
        let url = renderer(&server)
            .render(&template, &["Reading the study".into(), "Reading the headline".into()])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://i.imgflip.com/8abc.jpg");
    }

    #[tokio::test]
    async fn test_many_slots_use_boxes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/caption_image")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("boxes[0][text]".into(), "one".into()),
                Matcher::UrlEncoded("boxes[1][text]".into(), "two".into()),
                Matcher::UrlEncoded("boxes[2][text]".into(), "three".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"success":true,"data":{"url":"https://i.imgflip.com/3box.jpg"}}"#)
            .create_async()
            .await;

        let template = TemplateRecord::new("93895088", "Expanding Brain", 3);
        let url = renderer(&server)
            .render(&template, &["one".into(), "two".into(), "three".into()])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(url, "https://i.imgflip.com/3box.jpg");
    }

    #[tokio::test]
    async fn test_api_failure_is_render_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/caption_image")
            .with_status(200)
            .with_body(r#"{"success":false,"error_message":"Invalid username/password"}"#)
            .create_async()
            .await;

        let template = TemplateRecord::new("181913649", "Drake Hotline Bling", 2);
        let err = renderer(&server)
            .render(&template, &["a".into(), "b".into()])
            .await
            .unwrap_err();
        match err {
            Error::Render { template, message } => {
                assert_eq!(template, "181913649");
                assert!(message.contains("Invalid username"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_caption_count_never_hits_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/caption_image").expect(0).create_async().await;

        let template = TemplateRecord::new("181913649", "Drake Hotline Bling", 2);
        let err = renderer(&server).render(&template, &["a".into()]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_popular_templates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/get_memes")
            .with_status(200)
            .with_body(
                r#"{"success":true,"data":{"memes":[{"id":"181913649","name":"Drake Hotline Bling","url":"https://i.imgflip.com/30b1gx.jpg","width":1200,"height":1200,"box_count":2,"captions":1000}]}}"#,
            )
            .create_async()
            .await;

        let templates = renderer(&server).popular_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].title, "Drake Hotline Bling");
        assert_eq!(templates[0].box_count, 2);
        assert_eq!(templates[0].image_url.as_deref(), Some("https://i.imgflip.com/30b1gx.jpg"));
    }
}
