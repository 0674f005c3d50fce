use gloop::PacketLossSimulation;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tick_rate: f64,
    pub player_limit: usize,
    pub bot_count: usize,
    pub target_orb_count: usize,
    pub map_width: f32,
    pub map_height: f32,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: gloop::constants::SERVER_GAME_REFRESH_RATE,
            player_limit: gloop::constants::PLAYER_LIMIT,
            bot_count: 0,
            target_orb_count: 200,
            map_width: gloop::constants::BASE_WIDTH,
            map_height: gloop::constants::BASE_HEIGHT,
            global_packet_loss: None,
        }
    }
}
