use noiiolelo_search::ProviderManager;

/// Shared application state / 应用共享状态
pub struct AppState {
    pub providers: ProviderManager,
}
