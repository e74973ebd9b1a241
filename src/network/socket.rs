// ===========================================================================
// Transport TCP en trames préfixées
//
// Chaque trame : longueur u32 petit-boutiste puis charge opaque. Les
// tailles rcvbuf/sndbuf du fichier de paramètres dimensionnent les
// tampons utilisateur (BufReader/BufWriter). Une borne dure sur la
// longueur annoncée protège contre les trames aberrantes.
// ===========================================================================

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto_error::CryptoError;

/// Borne dure sur la taille d'une trame (1 Gio) : au-delà, la longueur
/// annoncée est forcément corrompue
const MAX_FRAME_BYTES: u32 = 1 << 30;

pub struct FramedSocket {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl FramedSocket {
    pub(crate) fn from_stream(
        stream: TcpStream,
        rcvbuf_size: usize,
        sndbuf_size: usize,
    ) -> Result<FramedSocket, CryptoError> {
        let read_half = stream
            .try_clone()
            .map_err(|e| CryptoError::Io(format!("duplication du socket : {e}")))?;
        Ok(FramedSocket {
            reader: BufReader::with_capacity(rcvbuf_size.max(4096), read_half),
            writer: BufWriter::with_capacity(sndbuf_size.max(4096), stream),
        })
    }

    /// Côté serveur : écoute sur le port et accepte une connexion
    pub fn listen(
        port: u16,
        rcvbuf_size: usize,
        sndbuf_size: usize,
    ) -> Result<FramedSocket, CryptoError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| CryptoError::Io(format!("bind sur le port {port} : {e}")))?;
        let (stream, _) = listener
            .accept()
            .map_err(|e| CryptoError::Io(format!("accept sur le port {port} : {e}")))?;
        Self::from_stream(stream, rcvbuf_size, sndbuf_size)
    }

    /// Côté client : se connecte à ip:port
    pub fn connect(
        ip: &str,
        port: u16,
        rcvbuf_size: usize,
        sndbuf_size: usize,
    ) -> Result<FramedSocket, CryptoError> {
        let stream = TcpStream::connect((ip, port))
            .map_err(|e| CryptoError::Io(format!("connexion à {ip}:{port} : {e}")))?;
        Self::from_stream(stream, rcvbuf_size, sndbuf_size)
    }

    pub fn send_frame(&mut self, payload: &[u8]) -> Result<(), CryptoError> {
        if payload.len() > MAX_FRAME_BYTES as usize {
            return Err(CryptoError::Protocol(format!(
                "trame de {} octets au-delà de la borne",
                payload.len()
            )));
        }
        self.writer
            .write_all(&(payload.len() as u32).to_le_bytes())
            .and_then(|_| self.writer.write_all(payload))
            .and_then(|_| self.writer.flush())
            .map_err(|e| CryptoError::Io(format!("émission de trame : {e}")))?;
        Ok(())
    }

    pub fn receive_frame(&mut self) -> Result<Vec<u8>, CryptoError> {
        let mut header = [0u8; 4];
        self.reader
            .read_exact(&mut header)
            .map_err(|e| CryptoError::Io(format!("réception d'en-tête : {e}")))?;
        let size = u32::from_le_bytes(header);
        if size > MAX_FRAME_BYTES {
            return Err(CryptoError::Protocol(format!(
                "longueur de trame annoncée aberrante : {size} octets"
            )));
        }
        let mut payload = vec![0u8; size as usize];
        self.reader
            .read_exact(&mut payload)
            .map_err(|e| CryptoError::Io(format!("réception de trame : {e}")))?;
        Ok(payload)
    }

    /// Trame bincode (clés, chiffrés)
    pub fn send_bin<T: Serialize>(&mut self, value: &T) -> Result<(), CryptoError> {
        self.send_frame(&bincode::serialize(value)?)
    }

    pub fn receive_bin<T: DeserializeOwned>(&mut self) -> Result<T, CryptoError> {
        Ok(bincode::deserialize(&self.receive_frame()?)?)
    }

    /// Trame texte (paramètres Cuckoo, tailles, dimensions)
    pub fn send_text(&mut self, text: &str) -> Result<(), CryptoError> {
        self.send_frame(text.as_bytes())
    }

    pub fn receive_text(&mut self) -> Result<String, CryptoError> {
        String::from_utf8(self.receive_frame()?)
            .map_err(|_| CryptoError::Protocol("trame texte non UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    // Paire de sockets connectés sur un port éphémère
    fn socket_pair() -> (FramedSocket, FramedSocket) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = thread::spawn(move || {
            let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
            FramedSocket::from_stream(stream, 8192, 8192).unwrap()
        });
        let (stream, _) = listener.accept().unwrap();
        let server = FramedSocket::from_stream(stream, 8192, 8192).unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn test_frame_roundtrip() {
        let (mut server, mut client) = socket_pair();
        client.send_frame(&[1, 2, 3, 4, 5]).unwrap();
        client.send_text("64 123").unwrap();
        assert_eq!(server.receive_frame().unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(server.receive_text().unwrap(), "64 123");
    }

    #[test]
    fn test_bin_roundtrip() {
        let (mut server, mut client) = socket_pair();
        let payload: Vec<u64> = (0..1000).collect();
        server.send_bin(&payload).unwrap();
        let received: Vec<u64> = client.receive_bin().unwrap();
        assert_eq!(received, payload);
    }

    #[test]
    fn test_empty_frame() {
        let (mut server, mut client) = socket_pair();
        client.send_frame(&[]).unwrap();
        assert!(server.receive_frame().unwrap().is_empty());
    }
}
