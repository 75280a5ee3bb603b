//! Forum login, performed before the first stage of a process when asked.

use tracing::{info, warn};

use crate::error::{AdapterError, JobError, JobResult};
use crate::pipeline::runner::StageRunner;

impl StageRunner {
    pub(crate) async fn login(&mut self) -> JobResult<()> {
        let stage = self.state.stage;
        let Some(credentials) = self.state.settings.credentials.clone() else {
            return Ok(());
        };
        let Some(login_url) = self.adapter.login_url(&self.state.settings) else {
            warn!(forum_type = %self.adapter.kind(), "Login is not supported for this forum type");
            self.status.error(format!(
                "Logging in is not supported for {} forums; continuing as a guest.",
                self.adapter.kind()
            ));
            return Ok(());
        };

        self.status.progress(format!("Logging in as {}", credentials.user));
        let page = self
            .fetch_page(&login_url)
            .await
            .map_err(|e| JobError::from_fetch(stage, e))?;
        let form = self
            .adapter
            .login_form(&self.state.settings, &credentials, &page.html)
            .map_err(|e| JobError::fatal(stage, e.to_string()))?;

        let response = self
            .post_page(&form.action, form.fields)
            .await
            .map_err(|e| JobError::from_fetch(stage, e))?;
        if !self
            .adapter
            .login_succeeded(&response.html, response.redirected_to.is_some())
        {
            let err = AdapterError::LoginRejected {
                user: credentials.user.clone(),
            };
            return Err(JobError::fatal(stage, err.to_string()));
        }

        info!(user = %credentials.user, "Logged in");
        if let Err(e) = self.client.persist_cookies() {
            warn!(error = %e, "Failed to persist cookies after login");
        }
        Ok(())
    }
}
