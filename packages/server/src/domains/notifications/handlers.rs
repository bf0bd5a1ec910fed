//! Email composition for each inbound event kind.

use crate::domains::auth::events::{DirectEmail, RegistrationCompleted, RegistrationRequested};
use crate::kernel::EmailMessage;

/// Settings the handlers need to address and link emails
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Sender for system emails and for direct emails without `from`
    pub sender: String,
    pub login_url: String,
}

pub fn verification_email(
    event: &RegistrationRequested,
    settings: &NotificationSettings,
) -> EmailMessage {
    let body = format!(
        "Hola {name},\n\n\
         Recibimos tu solicitud de registro en Carpeta Ciudadana.\n\
         Para activar tu cuenta, define tu contraseña en el siguiente enlace:\n\n\
         {url}\n\n\
         El enlace vence el {expiry} (UTC).\n\n\
         Si no solicitaste este registro, ignora este mensaje.\n",
        name = event.profile.full_name,
        url = event.verification_url,
        expiry = event.expires_at.format("%d/%m/%Y %H:%M:%S"),
    );

    EmailMessage {
        from: settings.sender.clone(),
        to: event.profile.email.clone(),
        subject: "Confirma tu registro en Carpeta Ciudadana".to_string(),
        body,
    }
}

pub fn welcome_email(event: &RegistrationCompleted, settings: &NotificationSettings) -> EmailMessage {
    let body = format!(
        "Hola {name},\n\n\
         Tu registro en Carpeta Ciudadana está completo y tu cuenta ya está activa.\n\
         Tu carpeta digital: {folder}\n\n\
         Inicia sesión en {login}\n",
        name = event.profile.full_name,
        folder = event.folder_id,
        login = settings.login_url,
    );

    EmailMessage {
        from: settings.sender.clone(),
        to: event.profile.email.clone(),
        subject: "Bienvenido a Carpeta Ciudadana".to_string(),
        body,
    }
}

pub fn direct_email(event: DirectEmail, settings: &NotificationSettings) -> EmailMessage {
    EmailMessage {
        from: event
            .from
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| settings.sender.clone()),
        to: event.to,
        subject: event.subject,
        body: event.body,
    }
}
