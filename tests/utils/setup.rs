#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gymrank::{
    progression::{Badge, Challenge, CheckInEvent, Reward, UserProgress},
    CheckInService, EngineConfig, EventBus, InMemoryRecordStore,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: Arc<InMemoryRecordStore>,
    pub service: Arc<CheckInService>,
    pub event_bus: EventBus,
}

pub struct TestSetupBuilder {
    store: InMemoryRecordStore,
    config: EngineConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            store: InMemoryRecordStore::new(),
            config: EngineConfig {
                retry_base_delay: Duration::from_millis(1),
                ..EngineConfig::default()
            },
        }
    }

    pub fn with_user(mut self, progress: UserProgress) -> Self {
        self.store = self.store.with_user(progress);
        self
    }

    pub fn with_users(mut self, user_ids: Vec<&str>) -> Self {
        for user_id in user_ids {
            self.store = self
                .store
                .with_user(UserProgress::new(user_id, Some("gym-1".to_string())));
        }
        self
    }

    pub fn with_challenge(mut self, challenge: Challenge) -> Self {
        self.store = self.store.with_challenge(challenge);
        self
    }

    pub fn with_badge(mut self, badge: Badge) -> Self {
        self.store = self.store.with_badge(badge);
        self
    }

    pub fn with_reward(mut self, reward: Reward) -> Self {
        self.store = self.store.with_reward(reward);
        self
    }

    pub fn with_check_in(mut self, check_in: CheckInEvent) -> Self {
        self.store = self.store.with_check_in(check_in);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TestSetup {
        let store = Arc::new(self.store);
        let event_bus = EventBus::new(64);
        let service = CheckInService::builder(store.clone())
            .with_config(self.config)
            .with_event_bus(event_bus.clone())
            .build();

        TestSetup {
            store,
            service: Arc::new(service),
            event_bus,
        }
    }
}
