fn main() {
    gesture_poller::run_cli();
}
