//! Sample pages served by the `ewfcore` binary

use crate::connection::identity::InMemoryIdentityProvider;
use crate::core::{DataModificationError, Result};
use crate::modification::ModificationContext;
use crate::page::lifecycle::LOG_IN_PAGE_TYPE;
use crate::page::{
    Checkbox, Container, Control, Destination, LoadContext, Page, PageCatalog, PageInfo, Parameters,
    PostBackButton, TextField,
};
use crate::request::RequestState;
use crate::session::StatusMessage;
use std::sync::Arc;

pub const PROFILE_PAGE_TYPE: &str = "profile";

fn profile_key(profile: &str, field: &str) -> String {
    format!("profile:{}:{}", profile, field)
}

fn save_field(
    m: &mut ModificationContext<'_>,
    profile: &str,
    field: &str,
    value: &str,
) -> Result<()> {
    m.data_access().put(None, &profile_key(profile, field), value)
}

/// Edits a profile stored in the primary database
pub struct ProfilePage {
    profile: String,
}

impl ProfilePage {
    pub fn new() -> Self {
        Self {
            profile: String::new(),
        }
    }
}

impl Default for ProfilePage {
    fn default() -> Self {
        Self::new()
    }
}

impl Page for ProfilePage {
    fn resolve_info(&mut self, parameters: &Parameters, _request: &mut RequestState) -> Result<PageInfo> {
        self.profile = parameters
            .get("profile")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        Ok(PageInfo::new(PROFILE_PAGE_TYPE).parameter("profile", &self.profile))
    }

    fn load_data(&mut self, ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let data = ctx.request.data_access();
        let name = data.query(None, &profile_key(&self.profile, "name"))?.unwrap_or_default();
        let email = data.query(None, &profile_key(&self.profile, "email"))?.unwrap_or_default();
        let newsletter = data.query(None, &profile_key(&self.profile, "newsletter"))?.as_deref() == Some("true");

        let (p1, p2, p3) = (self.profile.clone(), self.profile.clone(), self.profile.clone());
        let form = Container::new("profile_form")
            .child(
                TextField::new("name", "name", &name)
                    .required(true)
                    .max_length(100)
                    .on_save(move |m, value| save_field(m, &p1, "name", value)),
            )
            .child(
                Checkbox::new("newsletter", newsletter)
                    .shows(&["email"])
                    .on_save(move |m, checked| save_field(m, &p2, "newsletter", &checked.to_string())),
            )
            .child(
                TextField::new("email", "email address", &email)
                    .max_length(254)
                    .on_save(move |m, value| save_field(m, &p3, "email", value)),
            )
            .child(PostBackButton::new("save").submit().action(|m| {
                m.add_status_message(StatusMessage::info("Your profile has been saved."));
                Ok(())
            }));
        Ok(vec![Box::new(form)])
    }
}

/// Signs a session in and returns to the page that asked for it
pub struct LogInPage {
    identity: Arc<InMemoryIdentityProvider>,
    return_url: Option<String>,
}

impl LogInPage {
    pub fn new(identity: Arc<InMemoryIdentityProvider>) -> Self {
        Self {
            identity,
            return_url: None,
        }
    }
}

impl Page for LogInPage {
    fn resolve_info(&mut self, parameters: &Parameters, _request: &mut RequestState) -> Result<PageInfo> {
        self.return_url = parameters.get("return_url").cloned();
        let mut info = PageInfo::new(LOG_IN_PAGE_TYPE).intermediate_public(true);
        if let Some(url) = &self.return_url {
            info = info.parameter("return_url", url);
        }
        Ok(info)
    }

    fn load_data(&mut self, _ctx: &mut LoadContext<'_>) -> Result<Vec<Box<dyn Control>>> {
        let identity = Arc::clone(&self.identity);
        let return_url = self.return_url.clone();
        let button = PostBackButton::new("log_in").submit().action(move |m| {
            let email = m.values.get("email").unwrap_or_default().trim().to_string();
            let password = m.values.get("password").unwrap_or_default().to_string();
            let user = identity
                .authenticate(&email, &password)
                .map_err(|_| DataModificationError::single("The email address or password is incorrect."))?;
            let token = m
                .request
                .session_token()
                .map(str::to_string)
                .ok_or_else(|| DataModificationError::single("Your browser did not send a session cookie."))?;
            identity.bind_session(&token, user.user_id())?;
            m.request.clear_user();
            if let Some(url) = &return_url {
                m.redirect_to(Destination::External(url.clone()));
            }
            Ok(())
        });
        Ok(vec![
            Box::new(TextField::new("email", "email address", "").required(true)),
            Box::new(TextField::new("password", "password", "").required(true)),
            Box::new(button),
        ])
    }
}

/// The demo application's pages
pub fn demo_catalog(identity: Arc<InMemoryIdentityProvider>) -> PageCatalog {
    PageCatalog::new()
        .register(PROFILE_PAGE_TYPE, || Box::new(ProfilePage::new()))
        .register(LOG_IN_PAGE_TYPE, move || Box::new(LogInPage::new(Arc::clone(&identity))))
}
