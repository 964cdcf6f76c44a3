use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::config::Config;

const PLATFORM_NAME: &str = "Pharmacie en ligne";

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: String,
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host).ok()?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).ok()?
        };
        let transport = builder.port(port).credentials(creds).build();

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self {
            transport,
            from,
            base_url: config.app_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn link(&self, path: &str, token: &str) -> String {
        format!("{}/{path}?token={token}", self.base_url)
    }

    fn mailbox(to_email: &str, to_name: &str) -> anyhow::Result<Mailbox> {
        format!("{to_name} <{to_email}>")
            .parse()
            .or_else(|_| to_email.parse())
            .with_context(|| format!("invalid recipient address {to_email}"))
    }

    /// Minimal HTML body: a title, paragraphs, and an optional call to action.
    fn wrap_html(title: &str, paragraphs: &[String], action: Option<(&str, &str)>) -> String {
        let body: String = paragraphs
            .iter()
            .map(|p| format!(r#"<p style="margin:0 0 16px 0;font-size:15px;color:#334155;line-height:1.6">{p}</p>"#))
            .collect();
        let button = action
            .map(|(label, url)| {
                format!(
                    r#"<p style="margin:24px 0"><a href="{url}" style="display:inline-block;padding:12px 24px;background:#059669;color:#ffffff;text-decoration:none;font-weight:600;border-radius:8px">{label}</a></p>"#
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html lang="fr">
<head><meta charset="utf-8"><title>{title}</title></head>
<body style="margin:0;padding:32px 16px;background:#f1f5f9;font-family:-apple-system,'Segoe UI',Roboto,Arial,sans-serif">
  <div style="max-width:520px;margin:0 auto;background:#ffffff;border-radius:12px;padding:32px">
    <h1 style="margin:0 0 20px 0;font-size:20px;color:#0f172a">{title}</h1>
    {body}{button}
  </div>
  <p style="text-align:center;font-size:12px;color:#94a3b8">{PLATFORM_NAME}</p>
</body>
</html>"#
        )
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    pub async fn send_verification(&self, to_email: &str, to_name: &str, token: &str) -> anyhow::Result<()> {
        let url = self.link("verify-email", token);
        let text = format!(
            "Bonjour {to_name},\n\n\
            Confirmez votre adresse email en ouvrant ce lien (valide 24 heures) :\n{url}\n\n\
            {PLATFORM_NAME}"
        );
        let html = Self::wrap_html(
            "Confirmez votre adresse email",
            &[
                format!("Bonjour <strong>{to_name}</strong>,"),
                "Merci pour votre inscription. Le lien ci-dessous est valide 24 heures.".to_string(),
            ],
            Some(("Confirmer mon email", &url)),
        );
        self.send_email(Self::mailbox(to_email, to_name)?, "Confirmez votre adresse email", &text, &html)
            .await
    }

    pub async fn send_password_reset(&self, to_email: &str, to_name: &str, token: &str) -> anyhow::Result<()> {
        let url = self.link("reset-password", token);
        let text = format!(
            "Bonjour {to_name},\n\n\
            Vous avez demandé une réinitialisation de mot de passe.\n\
            Ce lien est valide 1 heure :\n{url}\n\n\
            Si vous n'avez pas fait cette demande, ignorez cet email.\n\n\
            {PLATFORM_NAME}"
        );
        let html = Self::wrap_html(
            "Réinitialisation de mot de passe",
            &[
                format!("Bonjour <strong>{to_name}</strong>,"),
                "Vous avez demandé une réinitialisation de mot de passe. Ce lien expire dans 1 heure.".to_string(),
                "Si vous n'avez pas fait cette demande, ignorez cet email.".to_string(),
            ],
            Some(("Réinitialiser mon mot de passe", &url)),
        );
        self.send_email(Self::mailbox(to_email, to_name)?, "Réinitialisation de mot de passe", &text, &html)
            .await
    }

    /// Outcome of a demande (pharmacy creation, profile change, account deletion).
    pub async fn send_demande_decision(
        &self,
        to_email: &str,
        to_name: &str,
        subject: &str,
        summary: &str,
        admin_comment: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut paragraphs = vec![format!("Bonjour <strong>{to_name}</strong>,"), summary.to_string()];
        let mut text = format!("Bonjour {to_name},\n\n{summary}\n");
        if let Some(comment) = admin_comment.filter(|c| !c.trim().is_empty()) {
            paragraphs.push(format!("Commentaire de l'administrateur : {comment}"));
            text.push_str(&format!("\nCommentaire de l'administrateur : {comment}\n"));
        }
        text.push_str(&format!("\n{PLATFORM_NAME}"));

        let html = Self::wrap_html(subject, &paragraphs, None);
        self.send_email(Self::mailbox(to_email, to_name)?, subject, &text, &html)
            .await
    }
}
