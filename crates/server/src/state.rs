use services::AppServices;

#[derive(Clone)]
pub struct AppState {
    pub services: AppServices,
}

impl AppState {
    pub fn new(services: AppServices) -> Self {
        Self { services }
    }
}
