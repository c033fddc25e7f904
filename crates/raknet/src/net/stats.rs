/// Socket-level counters kept by the endpoint.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub datagrams_dropped: u64,
}

impl NetworkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.packets_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn record_dropped(&mut self) {
        self.datagrams_dropped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = NetworkStats::default();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_received(7);
        stats.record_dropped();

        assert_eq!(stats.packets_sent, 2);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.bytes_received, 7);
        assert_eq!(stats.datagrams_dropped, 1);
    }
}
