/// How the discussion panel is shown. Only `Closed` has no session behind it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanelState {
    Closed,
    Collapsed,
    Expanded,
}

impl PanelState {
    pub fn is_open(&self) -> bool {
        !matches!(self, PanelState::Closed)
    }
}

impl Default for PanelState {
    fn default() -> PanelState {
        PanelState::Closed
    }
}

/// What the session has to do after a panel transition
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanelEffect {
    Connect,
    LoadSnapshot,
    Disconnect,
    DiscardPresence,
    ResetInitialized,
}

#[derive(Clone, Debug, Default)]
pub struct PanelController {
    state: PanelState,
    initialized: bool,

    /// Bumped on each open and close, so that work started for a previous opening can be
    /// recognized when it completes
    epoch: u64,
}

impl PanelController {
    pub fn new() -> PanelController {
        PanelController::default()
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn reset_initialized(&mut self) {
        self.initialized = false;
    }

    pub fn transition(&mut self, to: PanelState) -> Vec<PanelEffect> {
        let from = std::mem::replace(&mut self.state, to);
        match (from.is_open(), to.is_open()) {
            (false, true) => {
                self.epoch += 1;
                self.initialized = false;
                vec![
                    PanelEffect::ResetInitialized,
                    PanelEffect::Connect,
                    PanelEffect::LoadSnapshot,
                ]
            }
            (true, false) => {
                self.epoch += 1;
                self.initialized = false;
                vec![
                    PanelEffect::Disconnect,
                    PanelEffect::DiscardPresence,
                    PanelEffect::ResetInitialized,
                ]
            }
            // Collapsed and Expanded only differ by layout
            _ => Vec::new(),
        }
    }
}
